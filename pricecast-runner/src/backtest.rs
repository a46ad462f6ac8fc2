//! One-step backtest at a simulated date.
//!
//! The model only sees the 90 days of data ending at the simulated date D,
//! trains on the last `L + 1` complete rows and predicts one step ahead.
//! The prediction is compared with the first realized close within five
//! days after D.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use pricecast_core::backend::{forecaster, BackendKind, BackendRegistry};
use pricecast_core::config::{ConfigError, ForecastConfig};
use pricecast_core::data::{CompanyRef, MarketData};
use pricecast_core::dataset::{BuildOptions, DatasetBuilder};
use pricecast_core::domain::{CompanyId, ModelId};
use pricecast_core::error::ForecastError;
use pricecast_core::rng::SeedHierarchy;
use pricecast_core::training::{PreparedDataset, TrainingUnit};

use crate::runner::ForecasterFactory;
use crate::scoring::report::round_to;
use crate::scoring::PriceBook;

pub const BACKTEST_LOOKBACK_DAYS: i64 = 90;
pub const REALIZED_SEARCH_DAYS: i64 = 5;
const BACKTEST_DECIMALS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub company: CompanyRef,
    /// Simulated "today"; nothing after it is visible to the model.
    pub as_of: NaiveDate,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub company_id: CompanyId,
    pub ticker: String,
    pub backend: BackendKind,
    /// Registry id of the backend, when registered.
    pub model_id: Option<ModelId>,
    pub as_of: NaiveDate,
    pub training_rows: usize,
    pub predicted: f64,
    pub realized_date: NaiveDate,
    pub realized_close: f64,
    pub abs_error: f64,
    pub pct_error: f64,
}

#[derive(Debug, Clone)]
pub struct Backtester {
    config: ForecastConfig,
    factory: ForecasterFactory,
}

impl Backtester {
    pub fn new(config: ForecastConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: forecaster,
        })
    }

    pub fn with_factory(mut self, factory: ForecasterFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn run(
        &self,
        market: &dyn MarketData,
        request: &BacktestRequest,
    ) -> Result<BacktestResult, ForecastError> {
        let length = self.config.sequence_length;
        let (company, mut matrix, prices, model_id) = {
            let session = market.open_session()?;
            let company = session
                .resolve(&request.company)?
                .ok_or_else(|| ForecastError::Configuration(format!("unknown {}", request.company)))?;
            let options = BuildOptions {
                horizon_days: 0,
                lookback_days: BACKTEST_LOOKBACK_DAYS,
                as_of: Some(request.as_of),
            };
            let matrix = DatasetBuilder::new(options).build(&*session, &request.company)?;
            let prices = PriceBook::load(&*session, &[company.id])?;
            let registry = BackendRegistry::resolve(&session.models()?, &[request.backend]);
            (company, matrix, prices, registry.model_id(request.backend))
        };

        matrix.drop_incomplete();
        if matrix.n_rows() < length + 1 {
            return Err(ForecastError::DataSufficiency(format!(
                "{} complete rows before {}, need {}",
                matrix.n_rows(),
                request.as_of,
                length + 1
            )));
        }
        let prepared = PreparedDataset::prepare(matrix.tail(length + 1), length)?;

        let model = (self.factory)(request.backend, &self.config.params);
        let seed = SeedHierarchy::new(self.config.seed).unit_seed(company.id, request.backend);
        let run = TrainingUnit::new(1).run(&prepared, model.as_ref(), seed)?;
        let predicted = run
            .points
            .first()
            .map(|p| p.value)
            .ok_or_else(|| ForecastError::Computation("empty one-step forecast".into()))?;

        let (realized_date, realized_close) = prices
            .next_close_within(company.id, request.as_of, REALIZED_SEARCH_DAYS)
            .filter(|(_, close)| close.is_finite() && *close != 0.0)
            .ok_or_else(|| {
                ForecastError::DataSufficiency(format!(
                    "no realized close within {REALIZED_SEARCH_DAYS} days after {}",
                    request.as_of
                ))
            })?;

        let abs_error = (predicted - realized_close).abs();
        let result = BacktestResult {
            company_id: company.id,
            ticker: company.ticker,
            backend: request.backend,
            model_id,
            as_of: request.as_of,
            training_rows: run.training_rows,
            predicted: round_to(predicted, BACKTEST_DECIMALS),
            realized_date,
            realized_close: round_to(realized_close, BACKTEST_DECIMALS),
            abs_error: round_to(abs_error, BACKTEST_DECIMALS),
            pct_error: round_to(abs_error / realized_close.abs() * 100.0, BACKTEST_DECIMALS),
        };
        info!(
            company_id = %result.company_id,
            backend = %result.backend,
            as_of = %result.as_of,
            pct_error = result.pct_error,
            "backtest complete"
        );
        Ok(result)
    }
}
