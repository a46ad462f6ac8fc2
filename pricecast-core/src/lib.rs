//! Pricecast Core: feature alignment, scaling, forecasting backends, recursive rollout.
//!
//! This crate contains the forecasting half of the system:
//! - Domain types (price bars, statements, companies, prediction records)
//! - Scoped data-access sessions and as-of date alignment
//! - Feature dataset builder with typed column roles
//! - Min-max scaling and fixed-length training windows
//! - LSTM, GRU and gradient-boosted tree backends behind one contract
//! - The recursive H-day rollout shared by every backend

pub mod backend;
pub mod config;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod rng;
pub mod rollout;
pub mod scaling;
pub mod training;
pub mod window;

pub use error::{Disposition, ForecastError};
