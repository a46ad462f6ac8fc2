//! Batch runner: dataset build, every registered backend, persistence.
//!
//! One company at a time, one backend at a time. Each company's dataset
//! build holds its own market session, released before training starts.
//! A failing or panicking unit is recorded and the batch moves on; only
//! connection-level failures abort it.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, info_span, warn};

use pricecast_core::backend::{
    forecaster, BackendKind, BackendParams, BackendRegistry, Forecaster, RegisteredBackend,
};
use pricecast_core::config::{CompanySelector, ConfigError, ForecastConfig};
use pricecast_core::data::{CompanyRef, MarketData, SourceError};
use pricecast_core::dataset::DatasetBuilder;
use pricecast_core::domain::{Company, CompanyId, ModelId, PredictionRecord};
use pricecast_core::error::ForecastError;
use pricecast_core::rng::SeedHierarchy;
use pricecast_core::training::{ForecastRun, PreparedDataset, TrainingUnit};

use crate::store::{PredictionStore, StoreError};

/// Errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("selector matched no company: {0}")]
    UnknownCompany(String),
    #[error("no enabled backend is present in the model registry")]
    NoBackends,
    #[error("data source error: {0}")]
    Source(#[from] SourceError),
    #[error("fatal pipeline error: {0}")]
    Fatal(ForecastError),
    #[error("store error: {0}")]
    Store(StoreError),
}

/// How one (company, backend) unit ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Completed { inserted: usize, duplicates: usize },
    /// Not enough data; nothing was trained.
    Skipped { reason: String },
    Failed { reason: String },
    Panicked { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub company_id: CompanyId,
    pub ticker: String,
    pub backend: BackendKind,
    pub model_id: ModelId,
    pub status: UnitStatus,
    pub elapsed_ms: u64,
    /// Present when the unit completed.
    pub run: Option<ForecastRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub companies: usize,
    pub units: Vec<UnitOutcome>,
    pub inserted: usize,
    pub duplicates: usize,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Skipped { .. }))
    }

    /// Failed or panicked units.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed { .. } | UnitStatus::Panicked { .. }))
    }

    pub fn runs(&self) -> impl Iterator<Item = &ForecastRun> {
        self.units.iter().filter_map(|u| u.run.as_ref())
    }

    fn count(&self, pred: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.status)).count()
    }
}

/// Builds the untrained backend for a registry entry.
pub type ForecasterFactory = fn(BackendKind, &BackendParams) -> Box<dyn Forecaster>;

#[derive(Debug, Clone)]
pub struct BatchRunner {
    config: ForecastConfig,
    factory: ForecasterFactory,
}

impl BatchRunner {
    pub fn new(config: ForecastConfig) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: forecaster,
        })
    }

    /// Replace the built-in backends, e.g. with instrumented ones.
    pub fn with_factory(mut self, factory: ForecasterFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast every selected company with every registered backend and
    /// persist the points.
    pub fn run(
        &self,
        market: &dyn MarketData,
        store: &mut dyn PredictionStore,
    ) -> Result<BatchSummary, RunError> {
        let start = Instant::now();
        let (companies, registry) = self.plan(market)?;
        info!(
            source = market.name(),
            companies = companies.len(),
            backends = registry.entries().len(),
            "batch started"
        );

        let mut summary = BatchSummary {
            companies: companies.len(),
            ..BatchSummary::default()
        };
        for company in &companies {
            self.run_company(market, store, company, &registry, &mut summary)?;
        }

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            completed = summary.completed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            elapsed_ms = summary.elapsed_ms,
            "batch finished"
        );
        Ok(summary)
    }

    /// Resolve the selector and the backend registry in one short session.
    fn plan(&self, market: &dyn MarketData) -> Result<(Vec<Company>, BackendRegistry), RunError> {
        let session = market.open_session()?;
        let all = session.companies()?;
        let companies = select(&self.config.selector, all)?;
        let registry = BackendRegistry::resolve(&session.models()?, &self.config.backends);
        if registry.is_empty() {
            return Err(RunError::NoBackends);
        }
        Ok((companies, registry))
    }

    fn run_company(
        &self,
        market: &dyn MarketData,
        store: &mut dyn PredictionStore,
        company: &Company,
        registry: &BackendRegistry,
        summary: &mut BatchSummary,
    ) -> Result<(), RunError> {
        let span = info_span!("company", company_id = %company.id, ticker = %company.ticker);
        let _enter = span.enter();

        let prepared = match self.prepare(market, company) {
            Ok(prepared) => prepared,
            Err(e) if e.is_fatal() => return Err(RunError::Fatal(e)),
            Err(e) => {
                warn!(error = %e, "company skipped");
                for backend in registry.entries() {
                    summary.units.push(outcome(company, backend, skipped_or_failed(&e), 0, None));
                }
                return Ok(());
            }
        };

        let seeds = SeedHierarchy::new(self.config.seed);
        let unit = TrainingUnit::new(self.config.predict_days);
        for backend in registry.entries() {
            let started = Instant::now();
            let model = (self.factory)(backend.kind, &self.config.params);
            let seed = seeds.unit_seed(company.id, backend.kind);
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                unit.run(&prepared, model.as_ref(), seed)
            }));

            let (status, run) = match result {
                Ok(Ok(run)) => {
                    let (inserted, duplicates) = self.persist(store, backend, &run)?;
                    summary.inserted += inserted;
                    summary.duplicates += duplicates;
                    (UnitStatus::Completed { inserted, duplicates }, Some(run))
                }
                Ok(Err(e)) if e.is_fatal() => return Err(RunError::Fatal(e)),
                Ok(Err(e)) => {
                    warn!(backend = %backend.kind, error = %e, "unit skipped");
                    (skipped_or_failed(&e), None)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(backend = %backend.kind, message = %message, "unit panicked");
                    (UnitStatus::Panicked { message }, None)
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            summary.units.push(outcome(company, backend, status, elapsed_ms, run));
        }
        Ok(())
    }

    fn prepare(&self, market: &dyn MarketData, company: &Company) -> Result<PreparedDataset, ForecastError> {
        let matrix = {
            let session = market.open_session()?;
            DatasetBuilder::new(self.config.build_options())
                .build(session.as_ref(), &CompanyRef::id(company.id))?
        };
        PreparedDataset::prepare(matrix, self.config.sequence_length)
    }

    /// Insert every forecast point. Duplicates are counted and skipped.
    fn persist(
        &self,
        store: &mut dyn PredictionStore,
        backend: &RegisteredBackend,
        run: &ForecastRun,
    ) -> Result<(usize, usize), RunError> {
        let mut inserted = 0;
        let mut duplicates = 0;
        for point in &run.points {
            let record = PredictionRecord {
                date: point.date,
                model_id: backend.model_id,
                company_id: run.company_id,
                history_column_id: self.config.history_column_id,
                value: point.value,
                updated_by_user_id: self.config.updated_by_user_id,
            };
            match store.insert(record) {
                Ok(()) => inserted += 1,
                Err(e @ StoreError::Duplicate { .. }) => {
                    warn!(error = %e, "prediction row skipped");
                    duplicates += 1;
                }
                Err(e) => return Err(RunError::Store(e)),
            }
        }
        Ok((inserted, duplicates))
    }
}

fn select(selector: &CompanySelector, all: Vec<Company>) -> Result<Vec<Company>, RunError> {
    let selected: Vec<Company> = match selector {
        CompanySelector::All => all,
        CompanySelector::Company { id } => all.into_iter().filter(|c| c.id == *id).collect(),
        CompanySelector::Ticker { ticker } => all
            .into_iter()
            .filter(|c| c.ticker.eq_ignore_ascii_case(ticker))
            .collect(),
        CompanySelector::Sector { id } => all
            .into_iter()
            .filter(|c| c.sector_id == Some(*id))
            .collect(),
    };
    if selected.is_empty() && *selector != CompanySelector::All {
        return Err(RunError::UnknownCompany(format!("{selector:?}")));
    }
    Ok(selected)
}

fn skipped_or_failed(e: &ForecastError) -> UnitStatus {
    match e {
        ForecastError::DataSufficiency(_) => UnitStatus::Skipped { reason: e.to_string() },
        _ => UnitStatus::Failed { reason: e.to_string() },
    }
}

fn outcome(
    company: &Company,
    backend: &RegisteredBackend,
    status: UnitStatus,
    elapsed_ms: u64,
    run: Option<ForecastRun>,
) -> UnitOutcome {
    UnitOutcome {
        company_id: company.id,
        ticker: company.ticker.clone(),
        backend: backend.kind,
        model_id: backend.model_id,
        status,
        elapsed_ms,
        run,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_core::domain::SectorId;

    fn company(id: i64, ticker: &str, sector: i64) -> Company {
        Company {
            id: CompanyId(id),
            name: ticker.into(),
            ticker: ticker.into(),
            sector_id: Some(SectorId(sector)),
        }
    }

    fn universe() -> Vec<Company> {
        vec![company(1, "AAA3", 1), company(2, "BBB4", 1), company(3, "CCC3", 2)]
    }

    #[test]
    fn selector_all_keeps_everything() {
        assert_eq!(select(&CompanySelector::All, universe()).unwrap().len(), 3);
    }

    #[test]
    fn selector_by_sector_and_ticker() {
        let sector = select(&CompanySelector::Sector { id: SectorId(1) }, universe()).unwrap();
        assert_eq!(sector.iter().map(|c| c.id.0).collect::<Vec<_>>(), vec![1, 2]);
        let ticker = select(
            &CompanySelector::Ticker {
                ticker: "ccc3".into(),
            },
            universe(),
        )
        .unwrap();
        assert_eq!(ticker[0].id, CompanyId(3));
    }

    #[test]
    fn unmatched_selector_is_an_error() {
        let err = select(&CompanySelector::Company { id: CompanyId(99) }, universe()).unwrap_err();
        assert!(matches!(err, RunError::UnknownCompany(_)));
    }

    #[test]
    fn insufficient_data_is_a_skip() {
        let status = skipped_or_failed(&ForecastError::DataSufficiency("short".into()));
        assert!(matches!(status, UnitStatus::Skipped { .. }));
        let status = skipped_or_failed(&ForecastError::Computation("nan".into()));
        assert!(matches!(status, UnitStatus::Failed { .. }));
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
