//! Recursive multi-step rollout shared by every backend.
//!
//! The buffer starts as the last `L` scaled rows. Each step predicts the
//! next scaled target, appends a copy of the newest row with only the
//! target position replaced, and drops the oldest row. Exogenous features
//! are carried forward unchanged.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDate};
use ndarray::{Array2, ArrayView2};

use crate::backend::FittedModel;
use crate::domain::ForecastPoint;
use crate::error::ForecastError;
use crate::scaling::MinMaxScaler;

/// Sliding window of scaled feature rows with a fixed length.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBuffer {
    rows: VecDeque<Vec<f64>>,
    width: usize,
}

impl WindowBuffer {
    pub fn from_view(view: ArrayView2<'_, f64>) -> Self {
        Self {
            rows: view.rows().into_iter().map(|r| r.to_vec()).collect(),
            width: view.ncols(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), self.width), |(r, c)| self.rows[r][c])
    }

    /// Slide by one: copy the newest row, set its target, drop the oldest.
    pub fn push_prediction(&mut self, target_index: usize, value: f64) {
        let Some(mut next) = self.rows.back().cloned() else {
            return;
        };
        next[target_index] = value;
        self.rows.pop_front();
        self.rows.push_back(next);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveRoller {
    horizon: usize,
}

impl RecursiveRoller {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Roll `horizon` steps past `last_date`, returning values in price units.
    pub fn roll(
        &self,
        model: &dyn FittedModel,
        seed: ArrayView2<'_, f64>,
        target_index: usize,
        last_date: NaiveDate,
        target_scaler: &MinMaxScaler,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        self.roll_observed(model, seed, target_index, last_date, target_scaler, |_, _| {})
    }

    /// As [`roll`](Self::roll), calling `observe(step, buffer)` after each slide.
    pub fn roll_observed(
        &self,
        model: &dyn FittedModel,
        seed: ArrayView2<'_, f64>,
        target_index: usize,
        last_date: NaiveDate,
        target_scaler: &MinMaxScaler,
        mut observe: impl FnMut(usize, &WindowBuffer),
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        if target_index >= seed.ncols() {
            return Err(ForecastError::Integrity(format!(
                "target index {target_index} outside {} features",
                seed.ncols()
            )));
        }
        let mut buffer = WindowBuffer::from_view(seed);
        let mut points = Vec::with_capacity(self.horizon);
        for step in 1..=self.horizon {
            let scaled = model.predict_one(buffer.to_array().view());
            if !scaled.is_finite() {
                return Err(ForecastError::Computation(format!(
                    "non-finite prediction at step {step}"
                )));
            }
            buffer.push_prediction(target_index, scaled);
            observe(step, &buffer);
            points.push(ForecastPoint {
                date: last_date + Duration::days(step as i64),
                value: target_scaler.inverse_value(0, scaled),
            });
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Diagnostics;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Predicts the mean target of the window plus 0.1 and counts calls.
    struct Drift {
        calls: AtomicUsize,
        length: usize,
    }

    impl FittedModel for Drift {
        fn predict_one(&self, window: ArrayView2<'_, f64>) -> f64 {
            assert_eq!(window.nrows(), self.length);
            self.calls.fetch_add(1, Ordering::SeqCst);
            window.column(0).mean().unwrap_or(0.0) + 0.1
        }

        fn diagnostics(&self) -> Diagnostics {
            Diagnostics::Recurrent {
                loss_history: vec![],
            }
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn buffer_keeps_length_and_rotates_rows() {
        // Rows 1..=5, columns (target, exog).
        let seed = Array2::from_shape_fn((5, 2), |(r, c)| (r + 1) as f64 * if c == 0 { 1.0 } else { 10.0 });
        let mut buffer = WindowBuffer::from_view(seed.view());
        buffer.push_prediction(0, 0.5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.row(0), &[2.0, 20.0]);
        // New row copies the exogenous value of the previous last row.
        assert_eq!(buffer.row(4), &[0.5, 50.0]);
    }

    #[test]
    fn dates_step_one_calendar_day() {
        let seed = Array2::from_elem((3, 1), 0.5);
        let model = Drift {
            calls: AtomicUsize::new(0),
            length: 3,
        };
        let scaler = MinMaxScaler::fit_column(&[10.0, 20.0]).unwrap();
        let points = RecursiveRoller::new(4)
            .roll(&model, seed.view(), 0, d(10), &scaler)
            .unwrap();
        let dates: Vec<_> = points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(11), d(12), d(13), d(14)]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
        // First prediction 0.6 scaled → 16.0 in price units.
        assert!((points[0].value - 16.0).abs() < 1e-9);
    }

    #[test]
    fn predictions_feed_back_into_the_window() {
        let seed = Array2::from_elem((2, 1), 0.0);
        let model = Drift {
            calls: AtomicUsize::new(0),
            length: 2,
        };
        let scaler = MinMaxScaler::fit_column(&[0.0, 1.0]).unwrap();
        let points = RecursiveRoller::new(2)
            .roll(&model, seed.view(), 0, d(1), &scaler)
            .unwrap();
        // step 1: mean(0, 0) + 0.1; step 2: mean(0, 0.1) + 0.1.
        assert!((points[0].value - 0.1).abs() < 1e-12);
        assert!((points[1].value - 0.15).abs() < 1e-12);
    }

    #[test]
    fn target_index_out_of_range_is_rejected() {
        let seed = Array2::from_elem((2, 1), 0.0);
        let model = Drift {
            calls: AtomicUsize::new(0),
            length: 2,
        };
        let scaler = MinMaxScaler::fit_column(&[0.0, 1.0]).unwrap();
        assert!(RecursiveRoller::new(1)
            .roll(&model, seed.view(), 3, d(1), &scaler)
            .is_err());
    }
}
