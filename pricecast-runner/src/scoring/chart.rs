//! Prediction chart series for one ticker.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricecast_core::data::CompanyRef;
use pricecast_core::domain::{HistoryColumnId, PredictionRecord};

use super::engine::{ScoringContext, ScoringError};
use super::report::{round_to, ABSOLUTE_DECIMALS};

pub const CHART_DATE_FORMAT: &str = "%d/%m/%Y";

/// One chart x-position: realized close plus every model's prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// `dd/mm/yyyy`.
    pub date: String,
    pub close: Option<f64>,
    /// Lowercase model name to predicted value.
    pub models: BTreeMap<String, f64>,
}

/// Series of one company's `close_column` predictions, starting at the
/// first prediction date that has a realized close. Later dates without a
/// close are kept with `close: None`.
pub fn chart_series(
    ticker: &str,
    close_column: HistoryColumnId,
    records: &[PredictionRecord],
    context: &ScoringContext,
) -> Result<Vec<ChartPoint>, ScoringError> {
    let company = context
        .company(&CompanyRef::ticker(ticker))
        .ok_or_else(|| ScoringError::UnknownCompany(ticker.to_string()))?;

    let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    let own = records
        .iter()
        .filter(|r| r.company_id == company.id && r.history_column_id == close_column);
    for record in own {
        if !record.value.is_finite() {
            continue;
        }
        by_date.entry(record.date).or_default().insert(
            context.model_name(record.model_id).to_lowercase(),
            round_to(record.value, ABSOLUTE_DECIMALS),
        );
    }

    let close = |date: NaiveDate| {
        context
            .prices()
            .close_on(company.id, date)
            .filter(|c| c.is_finite())
            .map(|c| round_to(c, ABSOLUTE_DECIMALS))
    };
    Ok(by_date
        .into_iter()
        .skip_while(|(date, _)| close(*date).is_none())
        .map(|(date, models)| ChartPoint {
            date: date.format(CHART_DATE_FORMAT).to_string(),
            close: close(date),
            models,
        })
        .collect())
}
