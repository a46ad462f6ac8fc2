//! Recurrent backends (LSTM and GRU) trained by minibatch Adam.

mod cell;
mod network;

pub use cell::CellKind;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForecastError;
use crate::window::WindowSet;

use super::{BackendKind, Diagnostics, FittedModel, Forecaster};
use network::{Adam, RecurrentNet};

/// Architecture and optimizer settings shared by both cell types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrentParams {
    pub units: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for RecurrentParams {
    fn default() -> Self {
        Self {
            units: 50,
            dropout: 0.2,
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
        }
    }
}

impl RecurrentParams {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.units == 0 || self.batch_size == 0 {
            return Err(ForecastError::Configuration(
                "recurrent units and batch size must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::Configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ForecastError::Configuration(
                "learning rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecurrentForecaster {
    cell: CellKind,
    params: RecurrentParams,
}

impl RecurrentForecaster {
    pub fn new(cell: CellKind, params: RecurrentParams) -> Self {
        Self { cell, params }
    }
}

impl Forecaster for RecurrentForecaster {
    fn kind(&self) -> BackendKind {
        match self.cell {
            CellKind::Lstm => BackendKind::Lstm,
            CellKind::Gru => BackendKind::Gru,
        }
    }

    fn fit(&self, windows: &WindowSet, seed: u64) -> Result<Box<dyn FittedModel>, ForecastError> {
        self.params.validate()?;
        if windows.is_empty() {
            return Err(ForecastError::DataSufficiency("no training windows".into()));
        }
        let p = &self.params;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut net = RecurrentNet::new(self.cell, windows.width(), p.units, p.dropout, &mut rng);
        let mut adam = Adam::new(p.learning_rate, &net.params);

        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut loss_history = Vec::with_capacity(p.epochs);
        for epoch in 0..p.epochs {
            order.shuffle(&mut rng);
            let mut sum_sq = 0.0;
            for batch in order.chunks(p.batch_size) {
                let mut grads = net.params.zeros_like();
                let scale = 2.0 / batch.len() as f64;
                for &i in batch {
                    let (y, trace) = net.forward_train(windows.window(i), &mut rng);
                    let err = y - windows.label(i);
                    sum_sq += err * err;
                    net.backward(&trace, scale * err, &mut grads);
                }
                adam.step(&mut net.params, &grads);
            }
            let mse = sum_sq / windows.len() as f64;
            if !mse.is_finite() {
                return Err(ForecastError::Computation(format!(
                    "{} training diverged at epoch {epoch}",
                    self.kind()
                )));
            }
            debug!(backend = %self.kind(), epoch, loss = mse, "epoch complete");
            loss_history.push(mse);
        }

        Ok(Box::new(FittedRecurrent { net, loss_history }))
    }
}

struct FittedRecurrent {
    net: RecurrentNet,
    loss_history: Vec<f64>,
}

impl FittedModel for FittedRecurrent {
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> f64 {
        self.net.predict(window)
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::Recurrent {
            loss_history: self.loss_history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Scaled sine wave: the next value is a smooth function of the window.
    fn sine_windows(rows: usize, length: usize) -> WindowSet {
        let values: Vec<f64> = (0..rows)
            .map(|i| 0.5 + 0.4 * (i as f64 * 0.3).sin())
            .collect();
        let features = Array2::from_shape_fn((rows, 1), |(r, _)| values[r]);
        WindowSet::new(features, values, length, vec!["close".into()]).unwrap()
    }

    fn small() -> RecurrentParams {
        RecurrentParams {
            units: 8,
            dropout: 0.0,
            epochs: 30,
            batch_size: 8,
            learning_rate: 0.01,
        }
    }

    #[test]
    fn training_reduces_loss() {
        for cell in [CellKind::Lstm, CellKind::Gru] {
            let model = RecurrentForecaster::new(cell, small())
                .fit(&sine_windows(80, 6), 42)
                .unwrap();
            let Diagnostics::Recurrent { loss_history } = model.diagnostics() else {
                panic!("recurrent diagnostics expected");
            };
            assert_eq!(loss_history.len(), 30);
            assert!(loss_history[29] < loss_history[0], "{cell:?} did not learn");
        }
    }

    #[test]
    fn same_seed_same_model() {
        let windows = sine_windows(40, 5);
        let f = RecurrentForecaster::new(CellKind::Gru, RecurrentParams { epochs: 3, ..small() });
        let a = f.fit(&windows, 7).unwrap();
        let b = f.fit(&windows, 7).unwrap();
        let w = windows.last_window();
        assert_eq!(a.predict_one(w), b.predict_one(w));
    }

    #[test]
    fn invalid_dropout_is_configuration_error() {
        let f = RecurrentForecaster::new(
            CellKind::Lstm,
            RecurrentParams {
                dropout: 1.0,
                ..small()
            },
        );
        assert!(matches!(
            f.fit(&sine_windows(20, 5), 1),
            Err(ForecastError::Configuration(_))
        ));
    }
}
