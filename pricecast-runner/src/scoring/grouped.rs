//! Accuracy tables grouped by model and by date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricecast_core::domain::ModelId;

use super::metrics::{percent, ErrorMetrics};
use super::scored::{Direction, ScoredPrediction};

/// Directional precision split by predicted direction.
///
/// Only rows with a previous close take part. Flat predictions count in
/// neither the up nor the down bucket and are left out of the overall figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionalAccuracy {
    pub up_count: usize,
    pub down_count: usize,
    pub up_accuracy: Option<f64>,
    pub down_accuracy: Option<f64>,
    pub overall_accuracy: Option<f64>,
}

impl DirectionalAccuracy {
    pub fn compute<'a>(rows: impl IntoIterator<Item = &'a ScoredPrediction>) -> Self {
        let (mut up, mut up_hits, mut down, mut down_hits) = (0, 0, 0, 0);
        for row in rows {
            let (Some(direction), Some(hit)) = (row.predicted_direction, row.hit) else {
                continue;
            };
            match direction {
                Direction::Up => {
                    up += 1;
                    up_hits += usize::from(hit);
                }
                Direction::Down => {
                    down += 1;
                    down_hits += usize::from(hit);
                }
                Direction::Flat => {}
            }
        }
        Self {
            up_count: up,
            down_count: down,
            up_accuracy: percent(up_hits, up),
            down_accuracy: percent(down_hits, down),
            overall_accuracy: percent(up_hits + down_hits, up + down),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyAggregate {
    #[serde(flatten)]
    pub metrics: ErrorMetrics,
    #[serde(flatten)]
    pub direction: DirectionalAccuracy,
}

impl AccuracyAggregate {
    pub fn compute(rows: &[&ScoredPrediction]) -> Self {
        Self {
            metrics: ErrorMetrics::compute(rows.iter().copied()),
            direction: DirectionalAccuracy::compute(rows.iter().copied()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub model_id: ModelId,
    #[serde(flatten)]
    pub aggregate: AccuracyAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateAccuracy {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub aggregate: AccuracyAggregate,
}

/// One row per model, ordered by model id.
pub fn accuracy_by_model(rows: &[ScoredPrediction]) -> Vec<ModelAccuracy> {
    let mut groups: BTreeMap<ModelId, Vec<&ScoredPrediction>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.model_id).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(model_id, members)| ModelAccuracy {
            model_id,
            aggregate: AccuracyAggregate::compute(&members),
        })
        .collect()
}

/// One row per prediction date, ascending.
pub fn accuracy_by_date(rows: &[ScoredPrediction]) -> Vec<DateAccuracy> {
    let mut groups: BTreeMap<NaiveDate, Vec<&ScoredPrediction>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.date).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(date, members)| DateAccuracy {
            date,
            aggregate: AccuracyAggregate::compute(&members),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_core::domain::CompanyId;

    fn row(day: u32, model: i64, predicted: f64, realized: f64, prev: Option<f64>) -> ScoredPrediction {
        let predicted_direction = prev.map(|p| Direction::of(predicted - p));
        let realized_direction = prev.map(|p| Direction::of(realized - p));
        ScoredPrediction {
            date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
            company_id: CompanyId(1),
            model_id: ModelId(model),
            predicted,
            realized_close: realized,
            prev_close: prev,
            abs_error: (predicted - realized).abs(),
            pct_error: (predicted - realized).abs() / realized * 100.0,
            relative_error: (predicted - realized).abs() / realized,
            predicted_direction,
            realized_direction,
            hit: predicted_direction.zip(realized_direction).map(|(a, b)| a == b),
            rank: 1,
            winner: true,
        }
    }

    #[test]
    fn up_and_down_precision() {
        let rows = vec![
            row(2, 1, 11.0, 12.0, Some(10.0)), // up, hit
            row(3, 1, 11.0, 9.0, Some(10.0)),  // up, miss
            row(4, 1, 9.0, 8.0, Some(10.0)),   // down, hit
            row(5, 1, 10.0, 11.0, Some(10.0)), // flat
            row(6, 1, 10.0, 11.0, None),       // no previous close
        ];
        let acc = DirectionalAccuracy::compute(&rows);
        assert_eq!(acc.up_count, 2);
        assert_eq!(acc.down_count, 1);
        assert_eq!(acc.up_accuracy, Some(50.0));
        assert_eq!(acc.down_accuracy, Some(100.0));
        assert!((acc.overall_accuracy.unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn grouping_by_model_and_date() {
        let rows = vec![
            row(2, 2, 11.0, 12.0, Some(10.0)),
            row(2, 1, 13.0, 12.0, Some(10.0)),
            row(3, 1, 9.0, 8.0, Some(10.0)),
        ];
        let by_model = accuracy_by_model(&rows);
        assert_eq!(by_model.len(), 2);
        assert_eq!(by_model[0].model_id, ModelId(1));
        assert_eq!(by_model[0].aggregate.metrics.count, 2);

        let by_date = accuracy_by_date(&rows);
        assert_eq!(by_date.len(), 2);
        assert_eq!(by_date[0].aggregate.metrics.count, 2);
        assert_eq!(by_date[0].aggregate.direction.up_accuracy, Some(100.0));
    }

    #[test]
    fn empty_bucket_is_undefined() {
        let acc = DirectionalAccuracy::compute(&[]);
        assert_eq!(acc.up_accuracy, None);
        assert_eq!(acc.overall_accuracy, None);
    }
}
