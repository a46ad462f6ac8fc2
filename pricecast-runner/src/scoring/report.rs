//! Report shapes and rounding at the reporting boundary.
//!
//! Computation stays in full precision; only the structures built here are
//! rounded: 4 decimals for prices and absolute metrics, 3 for SMAPE and
//! percent errors, 2 for accuracy and hit-rate percentages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricecast_core::domain::{CompanyId, ModelId};

use super::grouped::{AccuracyAggregate, DateAccuracy, DirectionalAccuracy, ModelAccuracy};
use super::metrics::ErrorMetrics;
use super::scored::{Direction, ScoredPrediction};

pub const ABSOLUTE_DECIMALS: u32 = 4;
pub const PERCENT_ERROR_DECIMALS: u32 = 3;
pub const ACCURACY_DECIMALS: u32 = 2;

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn round_opt(value: Option<f64>, decimals: u32) -> Option<f64> {
    value.map(|v| round_to(v, decimals))
}

impl ErrorMetrics {
    pub fn rounded(&self) -> Self {
        Self {
            count: self.count,
            mae: round_opt(self.mae, ABSOLUTE_DECIMALS),
            rmse: round_opt(self.rmse, ABSOLUTE_DECIMALS),
            smape: round_opt(self.smape, PERCENT_ERROR_DECIMALS),
            r2: round_opt(self.r2, ABSOLUTE_DECIMALS),
            hit_rate: round_opt(self.hit_rate, ACCURACY_DECIMALS),
        }
    }
}

impl DirectionalAccuracy {
    pub fn rounded(&self) -> Self {
        Self {
            up_accuracy: round_opt(self.up_accuracy, ACCURACY_DECIMALS),
            down_accuracy: round_opt(self.down_accuracy, ACCURACY_DECIMALS),
            overall_accuracy: round_opt(self.overall_accuracy, ACCURACY_DECIMALS),
            ..*self
        }
    }
}

impl AccuracyAggregate {
    pub fn rounded(&self) -> Self {
        Self {
            metrics: self.metrics.rounded(),
            direction: self.direction.rounded(),
        }
    }
}

/// One scored prediction as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub company_id: CompanyId,
    pub ticker: String,
    pub model_id: ModelId,
    pub model_name: String,
    pub predicted: f64,
    pub realized_close: f64,
    pub prev_close: Option<f64>,
    pub abs_error: f64,
    pub pct_error: f64,
    /// `100 − pct_error`.
    pub comparison_percent: f64,
    pub relative_error: f64,
    pub predicted_direction: Option<Direction>,
    pub realized_direction: Option<Direction>,
    pub hit: Option<bool>,
    pub rank: usize,
    pub winner: bool,
}

impl ReportRow {
    pub fn from_scored(row: &ScoredPrediction, ticker: &str, model_name: &str) -> Self {
        Self {
            date: row.date,
            company_id: row.company_id,
            ticker: ticker.to_string(),
            model_id: row.model_id,
            model_name: model_name.to_string(),
            predicted: round_to(row.predicted, ABSOLUTE_DECIMALS),
            realized_close: round_to(row.realized_close, ABSOLUTE_DECIMALS),
            prev_close: round_opt(row.prev_close, ABSOLUTE_DECIMALS),
            abs_error: round_to(row.abs_error, ABSOLUTE_DECIMALS),
            pct_error: round_to(row.pct_error, PERCENT_ERROR_DECIMALS),
            comparison_percent: round_to(100.0 - row.pct_error, PERCENT_ERROR_DECIMALS),
            relative_error: round_to(row.relative_error, ABSOLUTE_DECIMALS),
            predicted_direction: row.predicted_direction,
            realized_direction: row.realized_direction,
            hit: row.hit,
            rank: row.rank,
            winner: row.winner,
        }
    }
}

/// Summary block of a scoring report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringStats {
    pub total_predictions: usize,
    pub scored: usize,
    /// Predictions without a usable realized close.
    pub excluded: usize,
    pub winners: usize,
    /// Metrics over the winning rows only.
    pub winner_metrics: ErrorMetrics,
    /// Every scored row, grouped by model.
    pub by_model: Vec<ModelAccuracy>,
    /// Every scored row, grouped by prediction date.
    pub by_date: Vec<DateAccuracy>,
}

/// `{stats, rows}` output of a scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringReport {
    pub stats: ScoringStats,
    pub rows: Vec<ReportRow>,
}

/// A report row merged with its model's and its date's overall accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRow {
    #[serde(flatten)]
    pub row: ReportRow,
    pub model_accuracy: Option<f64>,
    pub date_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyReport {
    pub company_id: CompanyId,
    pub ticker: String,
    pub stats: ScoringStats,
    pub rows: Vec<CompanyRow>,
    /// Earliest scored date, best model first.
    pub short_term: Vec<CompanyRow>,
    /// Latest scored date, best model first.
    pub long_term: Vec<CompanyRow>,
    /// The winner of each scored date, ascending by date.
    pub winners: Vec<CompanyRow>,
}
