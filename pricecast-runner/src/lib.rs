//! pricecast runner: batch forecasting, prediction persistence, scoring.
//!
//! This crate builds on `pricecast-core` to provide:
//! - Batch runs over a company selection with every registered backend
//! - The prediction store contract and an in-memory store
//! - Scoring of persisted predictions against realized closes
//! - Company, sector and chart reports
//! - One-step backtests at a simulated date
//! - JSON and CSV exports

pub mod backtest;
pub mod config;
pub mod export;
pub mod runner;
pub mod scoring;
pub mod store;

pub use backtest::{BacktestRequest, BacktestResult, Backtester};
pub use config::{RunId, RunnerConfig, ScoringConfig};
pub use runner::{BatchRunner, BatchSummary, ForecasterFactory, RunError, UnitOutcome, UnitStatus};
pub use scoring::{
    chart_series, ChartPoint, CompanyReport, ScoringContext, ScoringEngine, ScoringError,
    ScoringReport,
};
pub use store::{InMemoryPredictionStore, PredictionFilter, PredictionStore, StoreError};
