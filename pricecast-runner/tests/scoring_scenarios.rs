//! Worked scoring scenarios with hand-checked numbers.

use chrono::NaiveDate;
use pricecast_core::data::CompanyRef;
use pricecast_core::domain::{
    Company, CompanyId, HistoryColumnId, ModelEntry, ModelId, PredictionRecord, SectorId, UserId,
};
use pricecast_runner::scoring::{Direction, PriceBook};
use pricecast_runner::{ScoringContext, ScoringEngine};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
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

fn context(closes: &[(u32, f64)]) -> ScoringContext {
    let mut prices = PriceBook::new();
    for &(day, close) in closes {
        prices.insert(CompanyId(1), d(day), close);
    }
    ScoringContext::new(
        vec![Company {
            id: CompanyId(1),
            name: "Petrobras".into(),
            ticker: "PETR4".into(),
            sector_id: Some(SectorId(10)),
        }],
        vec![
            ModelEntry { id: ModelId(1), name: "LSTM".into() },
            ModelEntry { id: ModelId(2), name: "GRU".into() },
        ],
        prices,
    )
}

#[test]
fn closer_model_wins_and_both_directions_hit() {
    let context = context(&[(4, 9.5), (5, 10.0)]);
    let records = vec![record(5, 1, 10.5), record(5, 2, 9.8)];
    let engine = ScoringEngine::default();

    let set = engine.score(&records, &context);
    assert_eq!(set.rows.len(), 2);
    let model1 = &set.rows[0];
    let model2 = &set.rows[1];
    assert!((model1.relative_error - 0.05).abs() < 1e-12);
    assert!((model2.relative_error - 0.02).abs() < 1e-12);
    assert!(model2.winner && !model1.winner);
    assert_eq!(model2.rank, 1);
    assert_eq!(model1.rank, 2);
    assert_eq!(model1.hit, Some(true));
    assert_eq!(model2.hit, Some(true));
    assert_eq!(model2.predicted_direction, Some(Direction::Up));

    let report = engine.report(&records, &context);
    assert_eq!(report.stats.winners, 1);
    assert_eq!(report.stats.winner_metrics.mae, Some(0.2));
    assert_eq!(report.stats.winner_metrics.hit_rate, Some(100.0));
    assert_eq!(report.rows[0].model_name, "GRU");
    assert_eq!(report.rows[0].pct_error, 2.0);
    assert_eq!(report.rows[0].comparison_percent, 98.0);
}

#[test]
fn zero_close_is_excluded_without_error() {
    let context = context(&[(4, 9.5), (5, 0.0), (6, 10.0)]);
    let records = vec![record(5, 1, 10.5), record(6, 1, 10.1)];
    let engine = ScoringEngine::default();

    let report = engine.report(&records, &context);
    assert_eq!(report.stats.total_predictions, 2);
    assert_eq!(report.stats.excluded, 1);
    assert_eq!(report.stats.scored, 1);
    assert_eq!(report.rows[0].date, d(6));
}

#[test]
fn company_report_snapshots() {
    let context = context(&[(4, 9.5), (5, 10.0), (6, 10.4), (7, 10.1)]);
    let records = vec![
        record(5, 1, 10.5),
        record(5, 2, 9.8),
        record(6, 1, 10.3),
        record(6, 2, 10.9),
        record(7, 1, 10.6),
        record(7, 2, 10.0),
    ];
    let report = ScoringEngine::default()
        .company_report(&CompanyRef::ticker("PETR4"), &records, &context)
        .unwrap();

    assert_eq!(report.rows.len(), 6);
    assert_eq!(report.short_term[0].row.model_id, ModelId(2));
    assert!(report.short_term.iter().all(|r| r.row.date == d(5)));
    assert_eq!(report.long_term[0].row.model_id, ModelId(2));
    assert_eq!(
        report.winners.iter().map(|r| r.row.model_id.0).collect::<Vec<_>>(),
        vec![2, 1, 2]
    );
    assert_eq!(report.stats.by_date.len(), 3);
}
