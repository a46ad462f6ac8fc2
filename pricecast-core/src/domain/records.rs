//! Source records and forecast outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::{CompanyId, HistoryColumnId, ModelId, SectorId, UserId};

/// One daily row of a company's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub dividends: f64,
    pub splits: f64,
}

impl PriceBar {
    /// Bar with every price field set to `close` and no corporate actions.
    pub fn flat(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            dividends: 0.0,
            splits: 0.0,
        }
    }

    /// Value of a named price field. Unknown names yield `None`.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => None,
        }
    }
}

/// One observation of a macroeconomic indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Long-format financial statement entry.
///
/// `value` is `None` when the source text could not be parsed; such lines
/// are ignored by the dataset builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub account: String,
    pub reference_date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub ticker: String,
    pub sector_id: Option<SectorId>,
}

/// Entry of the persisted model registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub name: String,
}

/// A single future value produced by a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Persisted prediction row. Unique per (date, model, company, history column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub model_id: ModelId,
    pub company_id: CompanyId,
    pub history_column_id: HistoryColumnId,
    pub value: f64,
    pub updated_by_user_id: UserId,
}

impl PredictionRecord {
    /// Uniqueness key enforced by prediction stores.
    pub fn key(&self) -> (NaiveDate, ModelId, CompanyId, HistoryColumnId) {
        (self.date, self.model_id, self.company_id, self.history_column_id)
    }
}
