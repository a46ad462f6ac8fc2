//! Min-max scaling to `[0, 1]`, fitted per column.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Per-column min-max scaler.
///
/// A constant column scales to 0 and inverts back to its constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit on every row of `data`.
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self, ForecastError> {
        if data.nrows() == 0 {
            return Err(ForecastError::DataSufficiency(
                "cannot fit a scaler on zero rows".into(),
            ));
        }
        let mut mins = Vec::with_capacity(data.ncols());
        let mut ranges = Vec::with_capacity(data.ncols());
        for (j, column) in data.axis_iter(Axis(1)).enumerate() {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for &v in column {
                if !v.is_finite() {
                    return Err(ForecastError::Computation(format!(
                        "non-finite value in feature column {j}"
                    )));
                }
                lo = lo.min(v);
                hi = hi.max(v);
            }
            let range = hi - lo;
            mins.push(lo);
            ranges.push(if range > 0.0 { range } else { 1.0 });
        }
        Ok(Self { mins, ranges })
    }

    /// Fit a single-column scaler on a slice.
    pub fn fit_column(values: &[f64]) -> Result<Self, ForecastError> {
        let view = ArrayView2::from_shape((values.len(), 1), values)
            .map_err(|e| ForecastError::Computation(e.to_string()))?;
        Self::fit(view)
    }

    pub fn n_columns(&self) -> usize {
        self.mins.len()
    }

    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (lo, range) = (self.mins[j], self.ranges[j]);
            column.mapv_inplace(|v| (v - lo) / range);
        }
        out
    }

    pub fn inverse_transform(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (lo, range) = (self.mins[j], self.ranges[j]);
            column.mapv_inplace(|v| v * range + lo);
        }
        out
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        (value - self.mins[column]) / self.ranges[column]
    }

    pub fn inverse_value(&self, column: usize, value: f64) -> f64 {
        value * self.ranges[column] + self.mins[column]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scales_each_column_to_unit_interval() {
        let data = array![[1.0, 10.0], [3.0, 20.0], [2.0, 30.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();
        let scaled = scaler.transform(data.view());
        assert_eq!(scaled, array![[0.0, 0.0], [1.0, 0.5], [0.5, 1.0]]);
    }

    #[test]
    fn constant_column_maps_to_zero_and_back() {
        let data = array![[5.0], [5.0], [5.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();
        let scaled = scaler.transform(data.view());
        assert!(scaled.iter().all(|v| *v == 0.0));
        assert_eq!(scaler.inverse_transform(scaled.view()), data);
    }

    #[test]
    fn empty_input_is_insufficient() {
        let data = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            MinMaxScaler::fit(data.view()),
            Err(ForecastError::DataSufficiency(_))
        ));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let data = array![[1.0], [f64::NAN]];
        assert!(matches!(
            MinMaxScaler::fit(data.view()),
            Err(ForecastError::Computation(_))
        ));
    }

    #[test]
    fn single_value_helpers_match_matrix_transform() {
        let scaler = MinMaxScaler::fit_column(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(scaler.transform_value(0, 4.0), 0.5);
        assert_eq!(scaler.inverse_value(0, 0.25), 3.0);
    }
}
