//! Scoring engine: loads realized data once, then assembles reports.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use pricecast_core::data::{CompanyRef, MarketData, MarketSession, SourceError};
use pricecast_core::domain::{Company, CompanyId, ModelEntry, ModelId, PredictionRecord, SectorId};
use pricecast_core::error::ForecastError;

use crate::config::ScoringConfig;
use crate::store::{PredictionFilter, PredictionStore, StoreError};

use super::chart::{chart_series, ChartPoint};
use super::grouped::{accuracy_by_date, accuracy_by_model};
use super::metrics::ErrorMetrics;
use super::prices::PriceBook;
use super::report::{CompanyReport, CompanyRow, ReportRow, ScoringReport, ScoringStats};
use super::scored::{score_predictions, ScoredPrediction, ScoredSet};

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("unknown company: {0}")]
    UnknownCompany(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ScoringError> for ForecastError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::UnknownCompany(msg) => ForecastError::Configuration(msg),
            ScoringError::Source(e) => e.into(),
            ScoringError::Store(e) => e.into(),
        }
    }
}

/// Companies, model names and realized prices needed to score and label rows.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    companies: Vec<Company>,
    model_names: HashMap<ModelId, String>,
    prices: PriceBook,
}

impl ScoringContext {
    pub fn new(companies: Vec<Company>, models: Vec<ModelEntry>, prices: PriceBook) -> Self {
        Self {
            companies,
            model_names: models.into_iter().map(|m| (m.id, m.name)).collect(),
            prices,
        }
    }

    /// Read every company, the model registry and all price histories
    /// through one session.
    pub fn load(session: &dyn MarketSession) -> Result<Self, SourceError> {
        let companies = session.companies()?;
        let ids: Vec<CompanyId> = companies.iter().map(|c| c.id).collect();
        let prices = PriceBook::load(session, &ids)?;
        let models = session.models()?;
        Ok(Self::new(companies, models, prices))
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    pub fn company(&self, reference: &CompanyRef) -> Option<&Company> {
        self.companies.iter().find(|c| match reference {
            CompanyRef::Id { id } => c.id == *id,
            CompanyRef::Ticker { ticker } => c.ticker.eq_ignore_ascii_case(ticker),
        })
    }

    pub fn ticker(&self, id: CompanyId) -> String {
        self.companies
            .iter()
            .find(|c| c.id == id)
            .map_or_else(|| id.to_string(), |c| c.ticker.clone())
    }

    pub fn model_name(&self, id: ModelId) -> String {
        self.model_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("model_{id}"))
    }

    pub fn sector_companies(&self, sector: SectorId) -> Vec<CompanyId> {
        self.companies
            .iter()
            .filter(|c| c.sector_id == Some(sector))
            .map(|c| c.id)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Read the close-column predictions matching `filter` and the
    /// realized context. The session is released before returning.
    pub fn load(
        &self,
        market: &dyn MarketData,
        store: &dyn PredictionStore,
        filter: PredictionFilter,
    ) -> Result<(Vec<PredictionRecord>, ScoringContext), ScoringError> {
        let records = store.predictions(&filter.column(self.config.close_column_id))?;
        let session = market.open_session()?;
        let context = ScoringContext::load(&*session)?;
        Ok((records, context))
    }

    fn close_rows(&self, records: &[PredictionRecord]) -> Vec<PredictionRecord> {
        records
            .iter()
            .filter(|r| r.history_column_id == self.config.close_column_id)
            .cloned()
            .collect()
    }

    /// Score the close-column rows of `records` in full precision.
    pub fn score(&self, records: &[PredictionRecord], context: &ScoringContext) -> ScoredSet {
        score_predictions(&self.close_rows(records), context.prices())
    }

    /// Counts, winner metrics and grouped tables cover close-column rows only.
    pub fn report(&self, records: &[PredictionRecord], context: &ScoringContext) -> ScoringReport {
        let close = self.close_rows(records);
        let set = score_predictions(&close, context.prices());
        let stats = stats(close.len(), &set, &set.rows);
        let mut scored: Vec<&ScoredPrediction> = set.rows.iter().collect();
        scored.sort_by_key(|r| (r.date, r.company_id, r.rank));
        let rows = scored
            .into_iter()
            .map(|r| report_row(r, context))
            .collect();
        info!(
            predictions = stats.total_predictions,
            scored = stats.scored,
            excluded = stats.excluded,
            "scoring report"
        );
        ScoringReport { stats, rows }
    }

    /// Report restricted to the companies of one sector.
    pub fn sector_report(
        &self,
        sector: SectorId,
        records: &[PredictionRecord],
        context: &ScoringContext,
    ) -> ScoringReport {
        let members = context.sector_companies(sector);
        let in_sector: Vec<PredictionRecord> = records
            .iter()
            .filter(|r| members.contains(&r.company_id))
            .cloned()
            .collect();
        self.report(&in_sector, context)
    }

    /// Chart series of one ticker's close-column predictions.
    pub fn chart(
        &self,
        ticker: &str,
        records: &[PredictionRecord],
        context: &ScoringContext,
    ) -> Result<Vec<ChartPoint>, ScoringError> {
        chart_series(ticker, self.config.close_column_id, records, context)
    }

    /// Comparison of one company's models over its most recent scored dates.
    ///
    /// Rows, snapshots and `stats` cover the company's window. The
    /// `model_accuracy` and `date_accuracy` of each row come from the
    /// grouped tables over every company in `records`.
    pub fn company_report(
        &self,
        company: &CompanyRef,
        records: &[PredictionRecord],
        context: &ScoringContext,
    ) -> Result<CompanyReport, ScoringError> {
        let target = context
            .company(company)
            .ok_or_else(|| ScoringError::UnknownCompany(company.to_string()))?;
        let close = self.close_rows(records);
        let all = score_predictions(&close, context.prices());
        let model_accuracy: HashMap<ModelId, Option<f64>> = accuracy_by_model(&all.rows)
            .into_iter()
            .map(|m| (m.model_id, m.aggregate.rounded().direction.overall_accuracy))
            .collect();
        let date_accuracy: HashMap<NaiveDate, Option<f64>> = accuracy_by_date(&all.rows)
            .into_iter()
            .map(|d| (d.date, d.aggregate.rounded().direction.overall_accuracy))
            .collect();

        let own: Vec<PredictionRecord> = close
            .into_iter()
            .filter(|r| r.company_id == target.id)
            .collect();
        let set = score_predictions(&own, context.prices());

        let dates: BTreeSet<_> = set.rows.iter().map(|r| r.date).collect();
        let recent: BTreeSet<_> = dates
            .into_iter()
            .rev()
            .take(self.config.recent_dates)
            .collect();
        let mut window: Vec<&ScoredPrediction> =
            set.rows.iter().filter(|r| recent.contains(&r.date)).collect();
        window.sort_by_key(|r| (r.date, r.rank));

        let window_owned: Vec<ScoredPrediction> = window.iter().map(|r| (*r).clone()).collect();
        let stats = stats(own.len(), &set, &window_owned);

        let rows: Vec<CompanyRow> = window
            .iter()
            .map(|r| CompanyRow {
                row: report_row(r, context),
                model_accuracy: model_accuracy.get(&r.model_id).copied().flatten(),
                date_accuracy: date_accuracy.get(&r.date).copied().flatten(),
            })
            .collect();

        let first = recent.first().copied();
        let last = recent.last().copied();
        let on = |date: Option<NaiveDate>| -> Vec<CompanyRow> {
            rows.iter()
                .filter(|r| Some(r.row.date) == date)
                .cloned()
                .collect()
        };
        let short_term = on(first);
        let long_term = on(last);
        let winners = rows.iter().filter(|r| r.row.winner).cloned().collect();

        info!(
            company_id = %target.id,
            dates = recent.len(),
            rows = rows.len(),
            "company report"
        );
        Ok(CompanyReport {
            company_id: target.id,
            ticker: target.ticker.clone(),
            stats,
            rows,
            short_term,
            long_term,
            winners,
        })
    }
}

/// Build the stats block: winner metrics over `rows`, grouped tables over
/// every row in `rows`, counts from the whole scored set.
fn stats(total: usize, set: &ScoredSet, rows: &[ScoredPrediction]) -> ScoringStats {
    let winners: Vec<&ScoredPrediction> = rows.iter().filter(|r| r.winner).collect();
    ScoringStats {
        total_predictions: total,
        scored: rows.len(),
        excluded: set.excluded,
        winners: winners.len(),
        winner_metrics: ErrorMetrics::compute(winners.iter().copied()).rounded(),
        by_model: accuracy_by_model(rows)
            .into_iter()
            .map(|mut m| {
                m.aggregate = m.aggregate.rounded();
                m
            })
            .collect(),
        by_date: accuracy_by_date(rows)
            .into_iter()
            .map(|mut d| {
                d.aggregate = d.aggregate.rounded();
                d
            })
            .collect(),
    }
}

fn report_row(row: &ScoredPrediction, context: &ScoringContext) -> ReportRow {
    ReportRow::from_scored(
        row,
        &context.ticker(row.company_id),
        &context.model_name(row.model_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_core::domain::{HistoryColumnId, UserId};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, day).unwrap()
    }

    fn record(day: u32, model: i64, value: f64) -> PredictionRecord {
        PredictionRecord {
            date: d(day),
            model_id: ModelId(model),
            company_id: CompanyId(1),
            history_column_id: HistoryColumnId(6),
            value,
            updated_by_user_id: UserId(2),
        }
    }

    fn context() -> ScoringContext {
        let mut prices = PriceBook::new();
        for (day, close) in [(1, 10.0), (2, 10.5), (3, 10.2), (4, 10.8), (7, 11.0)] {
            prices.insert(CompanyId(1), d(day), close);
        }
        let companies = vec![Company {
            id: CompanyId(1),
            name: "Petrobras".into(),
            ticker: "PETR4".into(),
            sector_id: Some(SectorId(10)),
        }];
        let models = vec![
            ModelEntry { id: ModelId(1), name: "LSTM".into() },
            ModelEntry { id: ModelId(2), name: "XGBoost".into() },
        ];
        ScoringContext::new(companies, models, prices)
    }

    fn records() -> Vec<PredictionRecord> {
        let mut out = Vec::new();
        for day in [2, 3, 4, 7, 8] {
            out.push(record(day, 1, 10.4));
            out.push(record(day, 2, 10.9));
        }
        out
    }

    #[test]
    fn other_history_columns_are_ignored() {
        let mut other = record(2, 1, 10.5);
        other.history_column_id = HistoryColumnId(4);
        let engine = ScoringEngine::default();
        let report = engine.report(&[other.clone()], &context());
        assert_eq!(report.stats.total_predictions, 0);
        assert_eq!(report.stats.scored, 0);

        let mut mixed = records();
        mixed.push(other);
        let report = engine.report(&mixed, &context());
        assert_eq!(report.stats.total_predictions, 10);
        assert_eq!(
            report.stats.scored + report.stats.excluded,
            report.stats.total_predictions
        );
    }

    #[test]
    fn report_counts_and_labels() {
        let engine = ScoringEngine::default();
        let report = engine.report(&records(), &context());
        assert_eq!(report.stats.total_predictions, 10);
        assert_eq!(report.stats.scored, 8);
        assert_eq!(report.stats.excluded, 2);
        assert_eq!(report.stats.winners, 4);
        assert_eq!(report.rows[0].ticker, "PETR4");
        assert_eq!(report.rows[0].model_name, "LSTM");
        assert_eq!(report.stats.by_model.len(), 2);
        assert_eq!(report.stats.by_date.len(), 4);
    }

    #[test]
    fn company_report_keeps_recent_dates() {
        let engine = ScoringEngine::new(ScoringConfig {
            recent_dates: 2,
            ..ScoringConfig::default()
        });
        let report = engine
            .company_report(&CompanyRef::ticker("petr4"), &records(), &context())
            .unwrap();
        let dates: BTreeSet<_> = report.rows.iter().map(|r| r.row.date).collect();
        assert_eq!(dates.into_iter().collect::<Vec<_>>(), vec![d(4), d(7)]);
        assert!(report.short_term.iter().all(|r| r.row.date == d(4)));
        assert!(report.long_term.iter().all(|r| r.row.date == d(7)));
        assert_eq!(report.winners.len(), 2);
        // Best model first within a snapshot.
        assert!(report.long_term[0].row.relative_error <= report.long_term[1].row.relative_error);
    }

    #[test]
    fn company_rows_carry_grouped_accuracy() {
        let engine = ScoringEngine::default();
        let report = engine
            .company_report(&CompanyRef::id(CompanyId(1)), &records(), &context())
            .unwrap();
        let global = engine.report(&records(), &context());
        for row in &report.rows {
            let model = global
                .stats
                .by_model
                .iter()
                .find(|m| m.model_id == row.row.model_id)
                .unwrap();
            assert_eq!(row.model_accuracy, model.aggregate.direction.overall_accuracy);
            assert!((row.row.comparison_percent - (100.0 - row.row.pct_error)).abs() < 1.5e-3);
        }
    }

    #[test]
    fn company_rows_take_accuracy_across_all_companies() {
        let mut prices = PriceBook::new();
        for company in [CompanyId(1), CompanyId(2)] {
            prices.insert(company, d(1), 10.0);
            prices.insert(company, d(2), 11.0);
        }
        let company = |id: i64, ticker: &str| Company {
            id: CompanyId(id),
            name: ticker.into(),
            ticker: ticker.into(),
            sector_id: Some(SectorId(10)),
        };
        let context = ScoringContext::new(
            vec![company(1, "PETR4"), company(2, "PRIO3")],
            vec![ModelEntry { id: ModelId(1), name: "LSTM".into() }],
            prices,
        );
        let records = vec![
            record(2, 1, 10.8),
            PredictionRecord {
                company_id: CompanyId(2),
                ..record(2, 1, 9.0)
            },
        ];
        let engine = ScoringEngine::default();

        let global = engine.report(&records, &context);
        assert_eq!(global.stats.by_model[0].aggregate.direction.overall_accuracy, Some(50.0));

        let report = engine
            .company_report(&CompanyRef::id(CompanyId(1)), &records, &context)
            .unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].row.hit, Some(true));
        assert_eq!(report.rows[0].model_accuracy, Some(50.0));
        assert_eq!(report.rows[0].date_accuracy, Some(50.0));
    }

    #[test]
    fn chart_uses_the_close_column() {
        let mut other = record(2, 1, 99.0);
        other.history_column_id = HistoryColumnId(4);
        let mut recs = records();
        recs.push(other);
        let series = ScoringEngine::default().chart("PETR4", &recs, &context()).unwrap();
        assert_eq!(series[0].date, "02/10/2024");
        assert_eq!(series[0].models["lstm"], 10.4);
    }

    #[test]
    fn unknown_company_is_a_configuration_error() {
        let engine = ScoringEngine::default();
        let err = engine
            .company_report(&CompanyRef::ticker("NOPE3"), &records(), &context())
            .unwrap_err();
        assert!(matches!(err, ScoringError::UnknownCompany(_)));
        assert!(ForecastError::from(err).is_fatal());
    }

    #[test]
    fn sector_report_filters_members() {
        let engine = ScoringEngine::default();
        let mut recs = records();
        recs.push(PredictionRecord {
            company_id: CompanyId(99),
            ..record(2, 1, 10.0)
        });
        let report = engine.sector_report(SectorId(10), &recs, &context());
        assert_eq!(report.stats.total_predictions, 10);
        assert!(engine.sector_report(SectorId(20), &recs, &context()).rows.is_empty());
    }
}
