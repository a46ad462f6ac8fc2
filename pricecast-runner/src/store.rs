//! Prediction persistence contract.
//!
//! Rows are unique per (date, model, company, history column). A duplicate
//! insert is an integrity violation that skips only that row.

use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;

use pricecast_core::domain::{CompanyId, HistoryColumnId, ModelId, PredictionRecord};
use pricecast_core::error::ForecastError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate prediction for company {company_id}, model {model_id} on {date}")]
    Duplicate {
        date: NaiveDate,
        model_id: ModelId,
        company_id: CompanyId,
    },

    #[error("prediction store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ForecastError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { .. } => ForecastError::Integrity(err.to_string()),
            StoreError::Unavailable(msg) => ForecastError::Connection(msg),
        }
    }
}

/// Which persisted predictions to read back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionFilter {
    /// Restrict to these companies; `None` means every company.
    pub companies: Option<Vec<CompanyId>>,
    pub history_column_id: Option<HistoryColumnId>,
}

impl PredictionFilter {
    pub fn company(id: CompanyId) -> Self {
        Self {
            companies: Some(vec![id]),
            history_column_id: None,
        }
    }

    pub fn companies(ids: Vec<CompanyId>) -> Self {
        Self {
            companies: Some(ids),
            history_column_id: None,
        }
    }

    pub fn column(mut self, id: HistoryColumnId) -> Self {
        self.history_column_id = Some(id);
        self
    }

    pub fn matches(&self, record: &PredictionRecord) -> bool {
        let company_ok = self
            .companies
            .as_ref()
            .map_or(true, |ids| ids.contains(&record.company_id));
        let column_ok = self
            .history_column_id
            .map_or(true, |c| c == record.history_column_id);
        company_ok && column_ok
    }
}

pub trait PredictionStore {
    /// Insert one row, rejecting duplicates of an existing key.
    fn insert(&mut self, record: PredictionRecord) -> Result<(), StoreError>;

    /// Rows matching `filter`, in insertion order.
    fn predictions(&self, filter: &PredictionFilter) -> Result<Vec<PredictionRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPredictionStore {
    rows: Vec<PredictionRecord>,
    keys: HashSet<(NaiveDate, ModelId, CompanyId, HistoryColumnId)>,
}

impl InMemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PredictionRecord] {
        &self.rows
    }
}

impl PredictionStore for InMemoryPredictionStore {
    fn insert(&mut self, record: PredictionRecord) -> Result<(), StoreError> {
        if !self.keys.insert(record.key()) {
            return Err(StoreError::Duplicate {
                date: record.date,
                model_id: record.model_id,
                company_id: record.company_id,
            });
        }
        self.rows.push(record);
        Ok(())
    }

    fn predictions(&self, filter: &PredictionFilter) -> Result<Vec<PredictionRecord>, StoreError> {
        Ok(self.rows.iter().filter(|r| filter.matches(r)).cloned().collect())
    }
}
