//! Accuracy metrics as pure functions over predicted / realized pairs.
//!
//! Every metric returns `None` when it is undefined for the input (no rows,
//! or too little variation for R²) instead of producing NaN.

use serde::{Deserialize, Serialize};

use super::scored::ScoredPrediction;

/// Magnitude and direction metrics of one set of scored rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub count: usize,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub smape: Option<f64>,
    pub r2: Option<f64>,
    /// Percentage of hits among rows with a previous close.
    pub hit_rate: Option<f64>,
}

impl ErrorMetrics {
    pub fn compute<'a>(rows: impl IntoIterator<Item = &'a ScoredPrediction>) -> Self {
        let mut predicted = Vec::new();
        let mut realized = Vec::new();
        let mut hits = Vec::new();
        for row in rows {
            predicted.push(row.predicted);
            realized.push(row.realized_close);
            hits.push(row.hit);
        }
        Self {
            count: predicted.len(),
            mae: mae(&predicted, &realized),
            rmse: rmse(&predicted, &realized),
            smape: smape(&predicted, &realized),
            r2: r_squared(&predicted, &realized),
            hit_rate: hit_rate(&hits),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Mean absolute error.
pub fn mae(predicted: &[f64], realized: &[f64]) -> Option<f64> {
    let n = predicted.len().min(realized.len());
    if n == 0 {
        return None;
    }
    let sum: f64 = predicted.iter().zip(realized).map(|(p, r)| (p - r).abs()).sum();
    Some(sum / n as f64)
}

/// Root mean squared error.
pub fn rmse(predicted: &[f64], realized: &[f64]) -> Option<f64> {
    let n = predicted.len().min(realized.len());
    if n == 0 {
        return None;
    }
    let sum: f64 = predicted.iter().zip(realized).map(|(p, r)| (p - r).powi(2)).sum();
    Some((sum / n as f64).sqrt())
}

/// Symmetric mean absolute percentage error, in percent.
///
/// `mean(|p − r| / ((|p| + |r|) / 2)) × 100`. Pairs where both values are
/// zero contribute nothing and are not counted.
pub fn smape(predicted: &[f64], realized: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (p, r) in predicted.iter().zip(realized) {
        let denom = (p.abs() + r.abs()) / 2.0;
        if denom > 0.0 {
            sum += (p - r).abs() / denom;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f64 * 100.0)
}

/// Coefficient of determination of `predicted` against `realized`.
///
/// `None` with fewer than two distinct realized values.
pub fn r_squared(predicted: &[f64], realized: &[f64]) -> Option<f64> {
    let n = predicted.len().min(realized.len());
    let first = *realized.first()?;
    if n < 2 || realized[..n].iter().all(|r| *r == first) {
        return None;
    }
    let mean = realized[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = realized[..n].iter().map(|r| (r - mean).powi(2)).sum();
    let ss_res: f64 = predicted.iter().zip(realized).map(|(p, r)| (r - p).powi(2)).sum();
    if ss_tot <= 0.0 {
        return None;
    }
    Some(1.0 - ss_res / ss_tot)
}

/// Percentage of `Some(true)` among the defined entries.
pub fn hit_rate(hits: &[Option<bool>]) -> Option<f64> {
    let defined: Vec<bool> = hits.iter().flatten().copied().collect();
    if defined.is_empty() {
        return None;
    }
    let wins = defined.iter().filter(|h| **h).count();
    Some(wins as f64 / defined.len() as f64 * 100.0)
}

/// Percentage `part / whole × 100`, `None` for an empty whole.
pub fn percent(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let p = [1.0, 2.0, 3.0];
        assert_eq!(mae(&p, &p), Some(0.0));
        assert_eq!(rmse(&p, &p), Some(0.0));
        assert_eq!(smape(&p, &p), Some(0.0));
        assert_eq!(r_squared(&p, &p), Some(1.0));
    }

    #[test]
    fn known_values() {
        let p = [11.0, 9.0];
        let r = [10.0, 10.0 + 1e-12];
        assert!((mae(&p, &r).unwrap() - 1.0).abs() < 1e-9);
        assert!((rmse(&p, &r).unwrap() - 1.0).abs() < 1e-9);
        // 1/10.5 and 1/9.5 averaged.
        let expected = (1.0 / 10.5 + 1.0 / 9.5) / 2.0 * 100.0;
        assert!((smape(&p, &r).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn r_squared_needs_two_distinct_values() {
        assert_eq!(r_squared(&[1.0], &[1.0]), None);
        assert_eq!(r_squared(&[1.0, 2.0], &[5.0, 5.0]), None);
        assert_eq!(r_squared(&[], &[]), None);
        assert!(r_squared(&[1.0, 2.0], &[1.0, 3.0]).is_some());
    }

    #[test]
    fn empty_input_is_undefined() {
        assert_eq!(mae(&[], &[]), None);
        assert_eq!(rmse(&[], &[]), None);
        assert_eq!(smape(&[], &[]), None);
        assert_eq!(hit_rate(&[]), None);
        assert_eq!(hit_rate(&[None, None]), None);
        assert_eq!(percent(1, 0), None);
    }

    #[test]
    fn hit_rate_ignores_undefined() {
        assert_eq!(hit_rate(&[Some(true), None, Some(false), Some(true), Some(true)]), Some(75.0));
    }
}
