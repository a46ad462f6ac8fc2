//! Feature dataset builder.
//!
//! Joins a company's own prices, sector peers, macro indicators and
//! financial statements onto the company's own close-price dates.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::align::{as_of_fill, dedupe_observations};
use crate::data::statements::pivot_accounts;
use crate::data::{CompanyRef, MarketSession, SourceError};
use crate::domain::{Company, PriceBar};
use crate::error::ForecastError;

use super::matrix::{
    peer_column_name, ColumnRole, FeatureColumn, FeatureMatrix, ACCOUNT_PREFIX, MACRO_PREFIX,
    OWN_PRICE_FIELDS, PEER_PRICE_FIELDS, TARGET_COLUMN,
};

/// Window selection for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Forecast horizon in days; the window ends this many days before the
    /// last available price.
    pub horizon_days: i64,
    /// Length of the training window in days.
    pub lookback_days: i64,
    /// Ignore every observation dated after this day.
    pub as_of: Option<NaiveDate>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            lookback_days: 4 * 365,
            as_of: None,
        }
    }
}

impl BuildOptions {
    pub fn new(horizon_days: i64, lookback_years: i64) -> Self {
        Self {
            horizon_days,
            lookback_days: lookback_years * 365,
            as_of: None,
        }
    }

    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    options: BuildOptions,
}

impl DatasetBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the feature matrix for one company.
    pub fn build(
        &self,
        session: &dyn MarketSession,
        reference: &CompanyRef,
    ) -> Result<FeatureMatrix, ForecastError> {
        let company = session
            .resolve(reference)?
            .ok_or_else(|| ForecastError::Configuration(format!("unknown {reference}")))?;

        let own = match session.prices(company.id) {
            Ok(bars) => self.visible(bars),
            Err(SourceError::Missing { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let axis = self.axis(&own);
        if axis.is_empty() {
            return Err(ForecastError::DataSufficiency(format!(
                "no close prices in the training window for {}",
                company.ticker
            )));
        }

        let mut columns = Vec::new();
        columns.push(FeatureColumn {
            name: TARGET_COLUMN.to_string(),
            role: ColumnRole::Target,
            values: price_field(&own, &axis, TARGET_COLUMN),
        });
        for field in OWN_PRICE_FIELDS {
            columns.push(FeatureColumn {
                name: field.to_string(),
                role: ColumnRole::OwnPrice,
                values: price_field(&own, &axis, field),
            });
        }

        let peers = self.peer_columns(session, &company, &axis)?;
        let macros = self.macro_columns(session, &axis)?;
        let accounts = self.account_columns(session, &company, &axis)?;
        debug!(
            company_id = %company.id,
            peers = peers.len(),
            macros = macros.len(),
            accounts = accounts.len(),
            "merged exogenous columns"
        );
        columns.extend(peers);
        columns.extend(macros);
        columns.extend(accounts);

        let matrix = FeatureMatrix::new(company.id, axis, columns)?;
        info!(
            company_id = %company.id,
            ticker = %company.ticker,
            rows = matrix.n_rows(),
            features = matrix.n_features(),
            "feature matrix built"
        );
        Ok(matrix)
    }

    /// Sorted bars no later than `as_of`, one per date, with a finite close.
    fn visible(&self, mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
        if let Some(as_of) = self.options.as_of {
            bars.retain(|b| b.date <= as_of);
        }
        bars.retain(|b| b.close.is_finite());
        bars.sort_by_key(|b| b.date);
        // Last write wins for duplicated dates.
        let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(prev) if prev.date == bar.date => *prev = bar,
                _ => out.push(bar),
            }
        }
        out
    }

    /// Own close dates within `[max − lookback − horizon, max − horizon]`.
    fn axis(&self, own: &[PriceBar]) -> Vec<NaiveDate> {
        let Some(max_date) = own.last().map(|b| b.date) else {
            return Vec::new();
        };
        let upper = max_date - Duration::days(self.options.horizon_days);
        let lower = upper - Duration::days(self.options.lookback_days);
        own.iter()
            .map(|b| b.date)
            .filter(|d| *d >= lower && *d <= upper)
            .collect()
    }

    fn peer_columns(
        &self,
        session: &dyn MarketSession,
        company: &Company,
        axis: &[NaiveDate],
    ) -> Result<Vec<FeatureColumn>, ForecastError> {
        let mut peers = session.sector_peers(company)?;
        peers.sort_by_key(|p| p.id);

        let mut columns = Vec::new();
        for peer in peers {
            let bars = match session.prices(peer.id) {
                Ok(bars) => self.visible(bars),
                Err(SourceError::Missing { .. }) => {
                    debug!(peer_id = %peer.id, "peer has no price history, skipping");
                    continue;
                }
                Err(SourceError::Query(msg)) => {
                    warn!(peer_id = %peer.id, error = %msg, "peer price query failed, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if bars.is_empty() {
                continue;
            }
            for field in PEER_PRICE_FIELDS {
                columns.push(FeatureColumn {
                    name: peer_column_name(peer.id, field),
                    role: ColumnRole::Peer { company_id: peer.id },
                    values: price_field(&bars, axis, field),
                });
            }
        }
        Ok(columns)
    }

    fn macro_columns(
        &self,
        session: &dyn MarketSession,
        axis: &[NaiveDate],
    ) -> Result<Vec<FeatureColumn>, ForecastError> {
        let series = match session.macro_series() {
            Ok(series) => series,
            Err(SourceError::Connection(msg)) => return Err(ForecastError::Connection(msg)),
            Err(e) => {
                warn!(error = %e, "macro series unavailable, skipping");
                return Ok(Vec::new());
            }
        };
        let mut columns = Vec::new();
        for (name, points) in series {
            let observations = dedupe_observations(
                points
                    .iter()
                    .filter(|p| self.options.as_of.map_or(true, |a| p.date <= a))
                    .map(|p| (p.date, p.value)),
            );
            if observations.is_empty() {
                continue;
            }
            columns.push(FeatureColumn {
                name: format!("{MACRO_PREFIX}{name}"),
                role: ColumnRole::Macro,
                values: as_of_fill(axis, &observations),
            });
        }
        Ok(columns)
    }

    fn account_columns(
        &self,
        session: &dyn MarketSession,
        company: &Company,
        axis: &[NaiveDate],
    ) -> Result<Vec<FeatureColumn>, ForecastError> {
        let mut lines = match session.statements(company.id) {
            Ok(lines) => lines,
            Err(SourceError::Connection(msg)) => return Err(ForecastError::Connection(msg)),
            Err(e) => {
                warn!(company_id = %company.id, error = %e, "statements unavailable, skipping");
                return Ok(Vec::new());
            }
        };
        if let Some(as_of) = self.options.as_of {
            lines.retain(|l| l.reference_date <= as_of);
        }
        Ok(pivot_accounts(&lines, axis)
            .into_iter()
            .map(|(account, values)| FeatureColumn {
                name: format!("{ACCOUNT_PREFIX}{account}"),
                role: ColumnRole::Account,
                values,
            })
            .collect())
    }
}

fn price_field(bars: &[PriceBar], axis: &[NaiveDate], field: &str) -> Vec<f64> {
    let observations = dedupe_observations(
        bars.iter()
            .filter_map(|b| b.field(field).map(|v| (b.date, v))),
    );
    as_of_fill(axis, &observations)
}
