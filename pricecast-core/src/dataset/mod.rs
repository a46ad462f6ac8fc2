//! Feature dataset: the aligned matrix, its builder, and flat-table exchange.

pub mod builder;
pub mod frame;
pub mod matrix;

pub use builder::{BuildOptions, DatasetBuilder};
pub use frame::forecast_frame;
pub use matrix::{ColumnRole, FeatureColumn, FeatureMatrix, TARGET_COLUMN};
