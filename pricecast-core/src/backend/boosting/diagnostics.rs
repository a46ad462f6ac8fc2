//! Training diagnostics for the tree ensemble: importance, mutual
//! information, correlation. Reported, never fed back into forecasting.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;

/// Rows beyond this are evenly thinned before the O(n²) MI estimate.
const MI_MAX_ROWS: usize = 2000;
const MI_NEIGHBORS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub score: f64,
}

/// Pearson correlations; `None` where a column is constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDiagnostics {
    /// Training RMSE (scaled units) after each tree.
    pub train_rmse: Vec<f64>,
    /// Normalized gain, folded onto base features, descending.
    pub feature_importance: Vec<FeatureScore>,
    /// Mutual information of each base feature with the target, descending.
    pub mutual_information: Vec<FeatureScore>,
    pub correlation: CorrelationMatrix,
}

fn sort_desc(mut scores: Vec<FeatureScore>) -> Vec<FeatureScore> {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

/// Fold per-flat-index gains onto base features (`flat mod n_base`) and
/// normalize to sum to one.
pub fn fold_importance(flat_gains: &[f64], names: &[String]) -> Vec<FeatureScore> {
    let n_base = names.len();
    if n_base == 0 {
        return Vec::new();
    }
    let mut folded = vec![0.0; n_base];
    for (j, gain) in flat_gains.iter().enumerate() {
        folded[j % n_base] += gain;
    }
    let total: f64 = folded.iter().sum();
    if total > 0.0 {
        folded.iter_mut().for_each(|g| *g /= total);
    }
    sort_desc(
        names
            .iter()
            .zip(folded)
            .map(|(n, score)| FeatureScore {
                feature: n.clone(),
                score,
            })
            .collect(),
    )
}

fn standardize(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std < 1e-15 {
        return values.iter().map(|v| v - mean).collect();
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

/// Kraskov–Stögbauer–Grassberger estimate of I(X; Y), clipped at zero.
pub fn mutual_information(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n <= MI_NEIGHBORS {
        return 0.0;
    }
    let step = n.div_ceil(MI_MAX_ROWS);
    let idx: Vec<usize> = (0..n).step_by(step).collect();
    let x = standardize(&idx.iter().map(|&i| x[i]).collect::<Vec<_>>());
    let y = standardize(&idx.iter().map(|&i| y[i]).collect::<Vec<_>>());
    let n = x.len();
    if n <= MI_NEIGHBORS {
        return 0.0;
    }

    let mut acc = 0.0;
    let mut dists = Vec::with_capacity(n - 1);
    for i in 0..n {
        dists.clear();
        for j in 0..n {
            if j != i {
                dists.push((x[i] - x[j]).abs().max((y[i] - y[j]).abs()));
            }
        }
        dists.select_nth_unstable_by(MI_NEIGHBORS - 1, f64::total_cmp);
        let eps = dists[MI_NEIGHBORS - 1];
        let nx = (0..n).filter(|&j| j != i && (x[i] - x[j]).abs() < eps).count();
        let ny = (0..n).filter(|&j| j != i && (y[i] - y[j]).abs() < eps).count();
        acc += digamma(nx as f64 + 1.0) + digamma(ny as f64 + 1.0);
    }
    let mi = digamma(n as f64) + digamma(MI_NEIGHBORS as f64) - acc / n as f64;
    mi.max(0.0)
}

/// Mutual information of every column with `target`, descending.
pub fn rank_mutual_information(columns: &[Vec<f64>], names: &[String], target: &[f64]) -> Vec<FeatureScore> {
    sort_desc(
        columns
            .iter()
            .zip(names)
            .map(|(col, name)| FeatureScore {
                feature: name.clone(),
                score: mutual_information(col, target),
            })
            .collect(),
    )
}

pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let ma = a[..n].iter().sum::<f64>() / n as f64;
    let mb = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let (da, db) = (a[i] - ma, b[i] - mb);
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    if va < 1e-15 || vb < 1e-15 {
        return None;
    }
    Some(cov / (va * vb).sqrt())
}

pub fn correlation_matrix(columns: &[Vec<f64>], names: &[String]) -> CorrelationMatrix {
    let values = columns
        .iter()
        .map(|a| columns.iter().map(|b| pearson(a, b)).collect())
        .collect();
    CorrelationMatrix {
        names: names.to_vec(),
        values,
    }
}
