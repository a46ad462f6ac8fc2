//! Fixed-length training windows over a scaled feature matrix.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis, s};

use crate::error::ForecastError;

/// Supervised samples shared by every backend.
///
/// Sample `i` pairs the feature rows `[i, i + L)` with the scaled target at
/// row `i + L`, so there are `N − L` samples for `N` rows.
#[derive(Debug, Clone)]
pub struct WindowSet {
    features: Array2<f64>,
    targets: Vec<f64>,
    length: usize,
    feature_names: Vec<String>,
}

impl WindowSet {
    pub fn new(
        features: Array2<f64>,
        targets: Vec<f64>,
        length: usize,
        feature_names: Vec<String>,
    ) -> Result<Self, ForecastError> {
        if length == 0 {
            return Err(ForecastError::Configuration(
                "sequence length must be positive".into(),
            ));
        }
        if targets.len() != features.nrows() {
            return Err(ForecastError::Integrity(format!(
                "{} targets for {} feature rows",
                targets.len(),
                features.nrows()
            )));
        }
        if features.nrows() <= length {
            return Err(ForecastError::DataSufficiency(format!(
                "{} rows cannot form a window of length {length}",
                features.nrows()
            )));
        }
        Ok(Self {
            features,
            targets,
            length,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.nrows() - self.length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window length `L`.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Features per row.
    pub fn width(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// The `L × F` input of sample `i`.
    pub fn window(&self, i: usize) -> ArrayView2<'_, f64> {
        self.features.slice(s![i..i + self.length, ..])
    }

    /// Row-major flattening of sample `i`, as consumed by tree backends.
    pub fn flat(&self, i: usize) -> Vec<f64> {
        self.window(i).iter().copied().collect()
    }

    pub fn label(&self, i: usize) -> f64 {
        self.targets[i + self.length]
    }

    /// Scaled target over all rows, including the first `L`.
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn labels(&self) -> Vec<f64> {
        self.targets[self.length..].to_vec()
    }

    /// Scaled feature column `j` over all rows.
    pub fn feature_column(&self, j: usize) -> ArrayView1<'_, f64> {
        self.features.index_axis(Axis(1), j)
    }

    /// The last `L` rows, seed of a recursive rollout.
    pub fn last_window(&self) -> ArrayView2<'_, f64> {
        let n = self.features.nrows();
        self.features.slice(s![n - self.length..n, ..])
    }
}
