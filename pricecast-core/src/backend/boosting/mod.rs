//! Gradient-boosted regression trees over flattened windows.

pub mod diagnostics;
mod tree;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForecastError;
use crate::window::WindowSet;

use super::{BackendKind, Diagnostics, FittedModel, Forecaster};
use diagnostics::{correlation_matrix, fold_importance, rank_mutual_information, TreeDiagnostics};
use tree::{BinnedMatrix, GrowParams, RegressionTree, TreeGrower};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    /// Fraction of rows sampled per tree.
    pub subsample: f64,
    /// Fraction of flat features sampled per tree.
    pub colsample: f64,
    pub max_bins: usize,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 5,
            learning_rate: 0.1,
            lambda: 1.0,
            subsample: 0.8,
            colsample: 0.8,
            max_bins: 64,
            min_child_weight: 1.0,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), ForecastError> {
        let fraction = |v: f64| v > 0.0 && v <= 1.0;
        if !fraction(self.subsample) || !fraction(self.colsample) {
            return Err(ForecastError::Configuration(
                "subsample and colsample must be in (0, 1]".into(),
            ));
        }
        if self.n_estimators == 0 || self.max_bins < 2 {
            return Err(ForecastError::Configuration(
                "need at least one tree and two bins".into(),
            ));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 || self.lambda < 0.0 {
            return Err(ForecastError::Configuration(
                "learning rate must be positive and lambda non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradientBoostingForecaster {
    params: BoostingParams,
}

impl GradientBoostingForecaster {
    pub fn new(params: BoostingParams) -> Self {
        Self { params }
    }
}

fn rmse(pred: &[f64], labels: &[f64]) -> f64 {
    let sse: f64 = pred.iter().zip(labels).map(|(p, y)| (p - y).powi(2)).sum();
    (sse / labels.len() as f64).sqrt()
}

impl Forecaster for GradientBoostingForecaster {
    fn kind(&self) -> BackendKind {
        BackendKind::GradientBoosting
    }

    fn fit(&self, windows: &WindowSet, seed: u64) -> Result<Box<dyn FittedModel>, ForecastError> {
        let p = &self.params;
        p.validate()?;
        let n = windows.len();
        if n == 0 {
            return Err(ForecastError::DataSufficiency("no training windows".into()));
        }

        let rows: Vec<Vec<f64>> = (0..n).map(|i| windows.flat(i)).collect();
        let labels = windows.labels();
        let n_flat = windows.length() * windows.width();
        let binned = BinnedMatrix::new(&rows, n_flat, p.max_bins);
        drop(rows);

        let mut rng = StdRng::seed_from_u64(seed);
        let base_score = labels.iter().sum::<f64>() / n as f64;
        let mut pred = vec![base_score; n];
        let mut gains = vec![0.0; n_flat];
        let mut trees = Vec::with_capacity(p.n_estimators);
        let mut train_rmse = Vec::with_capacity(p.n_estimators);
        let grow = GrowParams {
            max_depth: p.max_depth,
            lambda: p.lambda,
            min_child_weight: p.min_child_weight,
            learning_rate: p.learning_rate,
        };
        let n_rows = ((n as f64 * p.subsample).ceil() as usize).clamp(1, n);
        let n_cols = ((n_flat as f64 * p.colsample).ceil() as usize).clamp(1, n_flat);

        for _ in 0..p.n_estimators {
            let gradients: Vec<f64> = pred.iter().zip(&labels).map(|(yhat, y)| yhat - y).collect();
            let mut sampled_rows = sample(&mut rng, n, n_rows).into_vec();
            sampled_rows.sort_unstable();
            let mut features = sample(&mut rng, n_flat, n_cols).into_vec();
            features.sort_unstable();

            let (tree, tree_gains, row_values) =
                TreeGrower::new(&binned, &gradients, &features, grow).grow(sampled_rows);
            for (acc, g) in gains.iter_mut().zip(tree_gains) {
                *acc += g;
            }
            for (yhat, v) in pred.iter_mut().zip(row_values) {
                *yhat += v;
            }
            let err = rmse(&pred, &labels);
            if !err.is_finite() {
                return Err(ForecastError::Computation(
                    "boosting produced non-finite predictions".into(),
                ));
            }
            train_rmse.push(err);
            trees.push(tree);
        }
        debug!(
            trees = trees.len(),
            final_rmse = train_rmse.last().copied().unwrap_or(f64::NAN),
            "tree ensemble fitted"
        );

        let names = windows.feature_names().to_vec();
        let columns: Vec<Vec<f64>> = (0..windows.width())
            .map(|j| windows.feature_column(j).to_vec())
            .collect();
        let target = windows.targets().to_vec();
        let diagnostics = TreeDiagnostics {
            train_rmse,
            feature_importance: fold_importance(&gains, &names),
            mutual_information: rank_mutual_information(&columns, &names, &target),
            correlation: correlation_matrix(&columns, &names),
        };

        Ok(Box::new(FittedEnsemble {
            base_score,
            trees,
            diagnostics,
        }))
    }
}

struct FittedEnsemble {
    base_score: f64,
    trees: Vec<RegressionTree>,
    diagnostics: TreeDiagnostics,
}

impl FittedModel for FittedEnsemble {
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> f64 {
        let flat: Vec<f64> = window.iter().copied().collect();
        self.base_score + self.trees.iter().map(|t| t.predict(&flat)).sum::<f64>()
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::Trees(self.diagnostics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn windows(rows: usize) -> WindowSet {
        let close: Vec<f64> = (0..rows).map(|i| i as f64 / rows as f64).collect();
        let noise: Vec<f64> = (0..rows).map(|i| ((i * 37) % 11) as f64 / 11.0).collect();
        let features = Array2::from_shape_fn((rows, 2), |(r, c)| if c == 0 { close[r] } else { noise[r] });
        WindowSet::new(features, close, 3, vec!["close".into(), "noise".into()]).unwrap()
    }

    fn small() -> BoostingParams {
        BoostingParams {
            n_estimators: 40,
            max_depth: 3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn training_rmse_decreases() {
        let model = GradientBoostingForecaster::new(small()).fit(&windows(120), 42).unwrap();
        let Diagnostics::Trees(diag) = model.diagnostics() else {
            panic!("tree diagnostics expected");
        };
        assert_eq!(diag.train_rmse.len(), 40);
        assert!(diag.train_rmse[39] < diag.train_rmse[0]);
    }

    #[test]
    fn importance_favours_the_informative_feature() {
        let model = GradientBoostingForecaster::new(small()).fit(&windows(120), 42).unwrap();
        let Diagnostics::Trees(diag) = model.diagnostics() else {
            panic!("tree diagnostics expected");
        };
        assert_eq!(diag.feature_importance[0].feature, "close");
        let total: f64 = diag.feature_importance.iter().map(|s| s.score).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(diag.mutual_information.len(), 2);
        assert_eq!(diag.correlation.names.len(), 2);
    }

    #[test]
    fn predictions_track_the_trend() {
        let set = windows(120);
        let model = GradientBoostingForecaster::new(small()).fit(&set, 42).unwrap();
        let early = model.predict_one(set.window(0));
        let late = model.predict_one(set.window(set.len() - 1));
        assert!(late > early);
    }

    #[test]
    fn deterministic_under_seed() {
        let set = windows(60);
        let f = GradientBoostingForecaster::new(small());
        let a = f.fit(&set, 9).unwrap().predict_one(set.last_window());
        let b = f.fit(&set, 9).unwrap().predict_one(set.last_window());
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_subsample_is_rejected() {
        let f = GradientBoostingForecaster::new(BoostingParams {
            subsample: 0.0,
            ..small()
        });
        assert!(matches!(f.fit(&windows(20), 1), Err(ForecastError::Configuration(_))));
    }
}
