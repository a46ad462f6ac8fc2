//! One (company, backend) training unit.
//!
//! A [`PreparedDataset`] is derived once per company: the cleaned matrix,
//! both scalers and the window set. Each backend then fits on it, is scored
//! in-sample, and rolls out `H` days. The fitted handle is dropped when the
//! unit ends.

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::backend::{BackendKind, Diagnostics, FittedModel, Forecaster};
use crate::dataset::FeatureMatrix;
use crate::domain::{CompanyId, DatasetHash, ForecastPoint};
use crate::error::ForecastError;
use crate::rollout::RecursiveRoller;
use crate::scaling::MinMaxScaler;
use crate::window::WindowSet;

/// Guard against division by a zero price in MAPE.
pub const MAPE_EPSILON: f64 = 1e-8;

/// How many of the latest in-sample points a run keeps for charts.
pub const RECENT_FIT_POINTS: usize = 200;

/// In-sample error of a fitted backend, in price units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    /// `None` when the real series is constant.
    pub r2: Option<f64>,
}

impl FitMetrics {
    pub fn compute(real: &[f64], fitted: &[f64]) -> Option<Self> {
        let n = real.len().min(fitted.len());
        if n == 0 {
            return None;
        }
        let nf = n as f64;
        let mut sq = 0.0;
        let mut abs = 0.0;
        let mut pct = 0.0;
        for (&r, &f) in real.iter().zip(fitted).take(n) {
            let e = r - f;
            sq += e * e;
            abs += e.abs();
            pct += (e / (r + MAPE_EPSILON)).abs();
        }

        let mean = real[..n].iter().sum::<f64>() / nf;
        let ss_tot: f64 = real[..n].iter().map(|r| (r - mean).powi(2)).sum();
        let r2 = (ss_tot > 0.0).then(|| 1.0 - sq / ss_tot);

        Some(Self {
            rmse: (sq / nf).sqrt(),
            mae: abs / nf,
            mape: pct / nf * 100.0,
            r2,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitPoint {
    pub date: NaiveDate,
    pub real: f64,
    pub fitted: f64,
}

/// Everything a unit produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub company_id: CompanyId,
    pub backend: BackendKind,
    pub dataset_hash: DatasetHash,
    pub training_rows: usize,
    pub points: Vec<ForecastPoint>,
    pub fit_metrics: Option<FitMetrics>,
    pub recent_fit: Vec<FitPoint>,
    pub diagnostics: Diagnostics,
}

/// Scaled, windowed view of one company's feature matrix.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    matrix: FeatureMatrix,
    hash: DatasetHash,
    feature_scaler: MinMaxScaler,
    target_scaler: MinMaxScaler,
    target_index: usize,
    windows: WindowSet,
}

impl PreparedDataset {
    /// Drop incomplete rows and columns, fit both scalers, cut windows.
    pub fn prepare(mut matrix: FeatureMatrix, sequence_length: usize) -> Result<Self, ForecastError> {
        let dropped = matrix.drop_incomplete();
        if dropped > 0 {
            debug!(company_id = %matrix.company_id(), dropped, "dropped incomplete rows");
        }
        let target_index = matrix
            .target_index()
            .ok_or_else(|| ForecastError::Integrity("feature matrix has no target column".into()))?;
        if matrix.n_rows() <= sequence_length {
            return Err(ForecastError::DataSufficiency(format!(
                "company {}: {} rows, window length {sequence_length}",
                matrix.company_id(),
                matrix.n_rows()
            )));
        }

        let raw = matrix.to_array();
        let feature_scaler = MinMaxScaler::fit(raw.view())?;
        let target: Vec<f64> = matrix.target().map(|t| t.to_vec()).unwrap_or_default();
        let target_scaler = MinMaxScaler::fit_column(&target)?;

        let scaled = feature_scaler.transform(raw.view());
        let scaled_target = target
            .iter()
            .map(|&v| target_scaler.transform_value(0, v))
            .collect();
        let windows = WindowSet::new(scaled, scaled_target, sequence_length, matrix.column_names())?;

        Ok(Self {
            hash: matrix.content_hash(),
            matrix,
            feature_scaler,
            target_scaler,
            target_index,
            windows,
        })
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    pub fn hash(&self) -> &DatasetHash {
        &self.hash
    }

    pub fn feature_scaler(&self) -> &MinMaxScaler {
        &self.feature_scaler
    }

    pub fn target_scaler(&self) -> &MinMaxScaler {
        &self.target_scaler
    }

    pub fn target_index(&self) -> usize {
        self.target_index
    }

    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }
}

/// Fit one backend on a prepared dataset and roll it forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingUnit {
    horizon: usize,
}

impl TrainingUnit {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn run(
        &self,
        prepared: &PreparedDataset,
        forecaster: &dyn Forecaster,
        seed: u64,
    ) -> Result<ForecastRun, ForecastError> {
        let company_id = prepared.matrix.company_id();
        let backend = forecaster.kind();
        let span = info_span!("unit", company_id = %company_id, backend = %backend);
        let _enter = span.enter();

        let start = Instant::now();
        let windows = prepared.windows();
        let model = forecaster.fit(windows, seed)?;
        let fit_ms = start.elapsed().as_millis() as u64;

        let (fit_metrics, recent_fit) = in_sample(prepared, model.as_ref());

        let last_date = prepared
            .matrix
            .last_date()
            .ok_or_else(|| ForecastError::DataSufficiency("empty feature matrix".into()))?;
        let points = RecursiveRoller::new(self.horizon).roll(
            model.as_ref(),
            windows.last_window(),
            prepared.target_index,
            last_date,
            &prepared.target_scaler,
        )?;

        info!(
            rows = prepared.matrix.n_rows(),
            samples = windows.len(),
            fit_ms,
            elapsed_ms = start.elapsed().as_millis() as u64,
            rmse = fit_metrics.map(|m| m.rmse),
            "unit complete"
        );

        Ok(ForecastRun {
            company_id,
            backend,
            dataset_hash: prepared.hash.clone(),
            training_rows: prepared.matrix.n_rows(),
            points,
            fit_metrics,
            recent_fit,
            diagnostics: model.diagnostics(),
        })
    }
}

fn in_sample(prepared: &PreparedDataset, model: &dyn FittedModel) -> (Option<FitMetrics>, Vec<FitPoint>) {
    let windows = prepared.windows();
    let dates = prepared.matrix.dates();
    let real_target = prepared.matrix.target().unwrap_or(&[]);
    let length = windows.length();

    let mut real = Vec::with_capacity(windows.len());
    let mut fitted = Vec::with_capacity(windows.len());
    for i in 0..windows.len() {
        let scaled = model.predict_one(windows.window(i));
        real.push(real_target[i + length]);
        fitted.push(prepared.target_scaler.inverse_value(0, scaled));
    }

    let skip = windows.len().saturating_sub(RECENT_FIT_POINTS);
    let recent = (skip..windows.len())
        .map(|i| FitPoint {
            date: dates[i + length],
            real: real[i],
            fitted: fitted[i],
        })
        .collect();
    (FitMetrics::compute(&real, &fitted), recent)
}
