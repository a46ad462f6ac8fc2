//! Per-row scoring: realized join, errors, direction, winner ranking.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pricecast_core::domain::{CompanyId, ModelId, PredictionRecord};

use super::prices::PriceBook;

/// Sign of a price move relative to the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Up
        } else if delta < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

/// A persisted prediction joined with the realized price it targeted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub date: NaiveDate,
    pub company_id: CompanyId,
    pub model_id: ModelId,
    pub predicted: f64,
    pub realized_close: f64,
    /// Most recent close strictly before `date`.
    pub prev_close: Option<f64>,
    pub abs_error: f64,
    /// `abs_error / realized_close × 100`.
    pub pct_error: f64,
    pub relative_error: f64,
    pub predicted_direction: Option<Direction>,
    pub realized_direction: Option<Direction>,
    /// `None` without a previous close.
    pub hit: Option<bool>,
    /// 1-based position within the (date, company) group.
    pub rank: usize,
    pub winner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredSet {
    /// Scored rows in input order.
    pub rows: Vec<ScoredPrediction>,
    /// Rows without a usable realized close.
    pub excluded: usize,
}

impl ScoredSet {
    pub fn winners(&self) -> impl Iterator<Item = &ScoredPrediction> {
        self.rows.iter().filter(|r| r.winner)
    }
}

/// Join predictions with realized closes and rank every (date, company) group.
///
/// A row whose realized close is missing, zero, or non-finite is excluded,
/// as is a row with a non-finite prediction. Ties in relative error keep
/// input order.
pub fn score_predictions(records: &[PredictionRecord], prices: &PriceBook) -> ScoredSet {
    let mut rows = Vec::with_capacity(records.len());
    let mut excluded = 0;
    for record in records {
        match score_row(record, prices) {
            Some(row) => rows.push(row),
            None => excluded += 1,
        }
    }
    rank_groups(&mut rows);
    ScoredSet { rows, excluded }
}

fn score_row(record: &PredictionRecord, prices: &PriceBook) -> Option<ScoredPrediction> {
    let real = prices.close_on(record.company_id, record.date)?;
    if !real.is_finite() || real == 0.0 || !record.value.is_finite() {
        return None;
    }
    let abs_error = (record.value - real).abs();
    let relative_error = abs_error / real.abs();

    let prev_close = prices
        .prev_close(record.company_id, record.date)
        .map(|(_, v)| v);
    let predicted_direction = prev_close.map(|p| Direction::of(record.value - p));
    let realized_direction = prev_close.map(|p| Direction::of(real - p));
    let hit = predicted_direction
        .zip(realized_direction)
        .map(|(p, r)| p == r);

    Some(ScoredPrediction {
        date: record.date,
        company_id: record.company_id,
        model_id: record.model_id,
        predicted: record.value,
        realized_close: real,
        prev_close,
        abs_error,
        pct_error: relative_error * 100.0,
        relative_error,
        predicted_direction,
        realized_direction,
        hit,
        rank: 0,
        winner: false,
    })
}

fn rank_groups(rows: &mut [ScoredPrediction]) {
    let mut groups: HashMap<(NaiveDate, CompanyId), Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups.entry((row.date, row.company_id)).or_default().push(i);
    }
    for members in groups.values_mut() {
        // Stable: equal errors keep first-seen order.
        members.sort_by(|&a, &b| rows[a].relative_error.total_cmp(&rows[b].relative_error));
        for (pos, &i) in members.iter().enumerate() {
            rows[i].rank = pos + 1;
            rows[i].winner = pos == 0;
        }
    }
}
