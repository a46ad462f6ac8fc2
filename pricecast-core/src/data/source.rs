//! Market data access traits and structured error types.
//!
//! `MarketData` hands out scope-bound sessions. A session is the only way
//! to read prices, macro series, statements and the model registry, and it
//! is released when dropped, so every exit path of a unit (success, row
//! failure, unit failure) gives the underlying resource back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Company, CompanyId, MacroPoint, ModelEntry, PriceBar, StatementLine};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store cannot be reached at all. Fatal for a batch.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A requested table or series does not exist.
    #[error("source missing: {what}")]
    Missing { what: String },

    #[error("query failed: {0}")]
    Query(String),
}

/// Reference to a company as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompanyRef {
    Id { id: CompanyId },
    Ticker { ticker: String },
}

impl CompanyRef {
    pub fn id(id: CompanyId) -> Self {
        CompanyRef::Id { id }
    }

    pub fn ticker(ticker: impl Into<String>) -> Self {
        CompanyRef::Ticker {
            ticker: ticker.into(),
        }
    }
}

impl std::fmt::Display for CompanyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompanyRef::Id { id } => write!(f, "company #{id}"),
            CompanyRef::Ticker { ticker } => write!(f, "ticker {ticker}"),
        }
    }
}

/// Factory for scoped sessions over a market data store.
pub trait MarketData: Send + Sync {
    /// Human-readable name of the store.
    fn name(&self) -> &str;

    /// Acquire a session. The session is released when dropped.
    fn open_session(&self) -> Result<Box<dyn MarketSession + '_>, SourceError>;
}

/// Read access to one store for the duration of a unit of work.
pub trait MarketSession {
    fn companies(&self) -> Result<Vec<Company>, SourceError>;

    /// Daily price history of a company, any order.
    fn prices(&self, company: CompanyId) -> Result<Vec<PriceBar>, SourceError>;

    /// All macro indicators keyed by indicator name.
    fn macro_series(&self) -> Result<BTreeMap<String, Vec<MacroPoint>>, SourceError>;

    fn statements(&self, company: CompanyId) -> Result<Vec<StatementLine>, SourceError>;

    /// Persisted model registry.
    fn models(&self) -> Result<Vec<ModelEntry>, SourceError>;

    fn resolve(&self, reference: &CompanyRef) -> Result<Option<Company>, SourceError> {
        let companies = self.companies()?;
        Ok(companies.into_iter().find(|c| match reference {
            CompanyRef::Id { id } => c.id == *id,
            CompanyRef::Ticker { ticker } => c.ticker.eq_ignore_ascii_case(ticker),
        }))
    }

    /// Companies of the same sector, excluding `company` itself.
    fn sector_peers(&self, company: &Company) -> Result<Vec<Company>, SourceError> {
        let Some(sector) = company.sector_id else {
            return Ok(Vec::new());
        };
        Ok(self
            .companies()?
            .into_iter()
            .filter(|c| c.sector_id == Some(sector) && c.id != company.id)
            .collect())
    }
}
