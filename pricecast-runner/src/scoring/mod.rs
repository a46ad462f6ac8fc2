//! Prediction scoring: realized-price join, winner ranking, accuracy
//! metrics, grouped tables and report assembly.

pub mod chart;
pub mod engine;
pub mod grouped;
pub mod metrics;
pub mod prices;
pub mod report;
pub mod scored;

pub use chart::{chart_series, ChartPoint};
pub use engine::{ScoringContext, ScoringEngine, ScoringError};
pub use grouped::{accuracy_by_date, accuracy_by_model, DateAccuracy, DirectionalAccuracy, ModelAccuracy};
pub use metrics::ErrorMetrics;
pub use prices::PriceBook;
pub use report::{CompanyReport, CompanyRow, ReportRow, ScoringReport, ScoringStats};
pub use scored::{score_predictions, Direction, ScoredPrediction, ScoredSet};
