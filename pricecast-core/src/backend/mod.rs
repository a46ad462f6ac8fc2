//! Forecasting backends behind one fit / predict-one contract.
//!
//! Every backend consumes the same [`WindowSet`] and produces a
//! [`FittedModel`] that maps one `L × F` scaled window to one scaled target
//! value. The recursive roller and the training pipeline only ever see these
//! two traits.

pub mod boosting;
pub mod recurrent;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::window::WindowSet;

pub use boosting::diagnostics::{CorrelationMatrix, FeatureScore, TreeDiagnostics};
pub use boosting::{BoostingParams, GradientBoostingForecaster};
pub use recurrent::{CellKind, RecurrentForecaster, RecurrentParams};
pub use registry::{BackendRegistry, RegisteredBackend};

/// Closed set of backends, resolved from names once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "lstm")]
    Lstm,
    #[serde(rename = "gru")]
    Gru,
    #[serde(rename = "xgboost", alias = "gradient_boosting")]
    GradientBoosting,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Lstm, BackendKind::Gru, BackendKind::GradientBoosting];

    /// Registry name, matching persisted model names.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Lstm => "lstm",
            BackendKind::Gru => "gru",
            BackendKind::GradientBoosting => "xgboost",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lstm" => Ok(BackendKind::Lstm),
            "gru" => Ok(BackendKind::Gru),
            "xgboost" | "gradient_boosting" => Ok(BackendKind::GradientBoosting),
            other => Err(ForecastError::Configuration(format!("unknown backend '{other}'"))),
        }
    }
}

/// What a fitted backend can report about its training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostics {
    Recurrent { loss_history: Vec<f64> },
    Trees(TreeDiagnostics),
}

/// An untrained backend.
pub trait Forecaster: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Train on every sample of `windows`. Same seed, same model.
    fn fit(&self, windows: &WindowSet, seed: u64) -> Result<Box<dyn FittedModel>, ForecastError>;
}

/// A trained backend handle.
pub trait FittedModel: Send {
    /// Scaled target estimate for the row following `window`.
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> f64;

    fn diagnostics(&self) -> Diagnostics;
}

/// Hyperparameters for every backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendParams {
    pub recurrent: RecurrentParams,
    pub boosting: BoostingParams,
}

impl BackendParams {
    pub fn validate(&self) -> Result<(), ForecastError> {
        self.recurrent.validate()?;
        self.boosting.validate()
    }
}

/// Instantiate the backend for `kind`.
pub fn forecaster(kind: BackendKind, params: &BackendParams) -> Box<dyn Forecaster> {
    match kind {
        BackendKind::Lstm => Box::new(RecurrentForecaster::new(CellKind::Lstm, params.recurrent.clone())),
        BackendKind::Gru => Box::new(RecurrentForecaster::new(CellKind::Gru, params.recurrent.clone())),
        BackendKind::GradientBoosting => {
            Box::new(GradientBoostingForecaster::new(params.boosting.clone()))
        }
    }
}
