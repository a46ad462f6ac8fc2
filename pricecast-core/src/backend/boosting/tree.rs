//! Histogram-binned regression trees for squared-error boosting.

use serde::{Deserialize, Serialize};

/// Quantile bin edges per feature plus the binned training matrix.
///
/// `bin(x)` counts the edges strictly below `x`, so `bin(x) <= b` holds
/// exactly when `x <= edges[b]`. Splits found on bins therefore route raw
/// values identically through `edges[b]`.
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    edges: Vec<Vec<f64>>,
    bins: Vec<u16>,
    n_rows: usize,
    n_features: usize,
}

impl BinnedMatrix {
    /// `rows` is row-major with `n_features` values per row.
    pub fn new(rows: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, u16::MAX as usize);
        let n_rows = rows.len();
        let mut edges = Vec::with_capacity(n_features);
        for j in 0..n_features {
            let mut values: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            edges.push(quantile_edges(&values, max_bins));
        }
        let mut bins = Vec::with_capacity(n_rows * n_features);
        for row in rows {
            for (j, value) in row.iter().enumerate() {
                bins.push(bin_of(&edges[j], *value));
            }
        }
        Self {
            edges,
            bins,
            n_rows,
            n_features,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn bin(&self, row: usize, feature: usize) -> usize {
        self.bins[row * self.n_features + feature] as usize
    }

    /// Number of bins of a feature (edges + 1).
    fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }
}

fn quantile_edges(sorted_unique: &[f64], max_bins: usize) -> Vec<f64> {
    let k = sorted_unique.len();
    if k <= 1 {
        return Vec::new();
    }
    if k <= max_bins {
        return sorted_unique[..k - 1].to_vec();
    }
    let mut edges: Vec<f64> = (1..max_bins)
        .map(|i| sorted_unique[i * k / max_bins - 1])
        .collect();
    edges.dedup();
    edges
}

fn bin_of(edges: &[f64], value: f64) -> u16 {
    edges.partition_point(|e| *e < value) as u16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        bin: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A fitted tree. Node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

/// Growth settings for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowParams {
    pub max_depth: usize,
    pub lambda: f64,
    pub min_child_weight: f64,
    pub learning_rate: f64,
}

pub(crate) struct TreeGrower<'a> {
    data: &'a BinnedMatrix,
    gradients: &'a [f64],
    features: &'a [usize],
    params: GrowParams,
    nodes: Vec<Node>,
    /// Split gain accumulated per flat feature index.
    gains: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

impl<'a> TreeGrower<'a> {
    /// `gradients` holds `prediction − label` per row; hessians are 1.
    pub fn new(
        data: &'a BinnedMatrix,
        gradients: &'a [f64],
        features: &'a [usize],
        params: GrowParams,
    ) -> Self {
        Self {
            data,
            gradients,
            features,
            params,
            nodes: Vec::new(),
            gains: vec![0.0; data.n_features()],
        }
    }

    /// Grow on the sampled `rows`. Returns the tree, the gain per feature,
    /// and the leaf value of every training row, sampled or not.
    pub fn grow(mut self, rows: Vec<usize>) -> (RegressionTree, Vec<f64>, Vec<f64>) {
        self.build(rows, 0);
        let tree = RegressionTree { nodes: self.nodes };
        let row_values = route_rows(&tree, self.data);
        (tree, self.gains, row_values)
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.gradients[r]).sum();
        let h = rows.len() as f64;
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        let split = if depth < self.params.max_depth {
            self.best_split(&rows, g, h)
        } else {
            None
        };
        let Some(split) = split else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.data.bin(r, split.feature) <= split.bin);
        self.gains[split.feature] += split.gain;
        let threshold = self.data.edges[split.feature][split.bin];
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            bin: split.bin,
            threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<BestSplit> {
        let lambda = self.params.lambda;
        let parent = g_total * g_total / (h_total + lambda);
        let mut best: Option<BestSplit> = None;

        for &feature in self.features {
            let n_bins = self.data.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let mut g_hist = vec![0.0; n_bins];
            let mut h_hist = vec![0.0; n_bins];
            for &r in rows {
                let b = self.data.bin(r, feature);
                g_hist[b] += self.gradients[r];
                h_hist[b] += 1.0;
            }
            let (mut g_left, mut h_left) = (0.0, 0.0);
            for b in 0..n_bins - 1 {
                g_left += g_hist[b];
                h_left += h_hist[b];
                let h_right = h_total - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }
                let g_right = g_total - g_left;
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent);
                if gain > 1e-12 && best.as_ref().map_or(true, |s| gain > s.gain) {
                    best = Some(BestSplit { feature, bin: b, gain });
                }
            }
        }
        best
    }
}

/// Leaf value of every binned training row.
fn route_rows(tree: &RegressionTree, data: &BinnedMatrix) -> Vec<f64> {
    (0..data.n_rows())
        .map(|row| {
            let mut idx = 0;
            loop {
                match &tree.nodes[idx] {
                    Node::Leaf { value } => return *value,
                    Node::Split {
                        feature,
                        bin,
                        left,
                        right,
                        ..
                    } => {
                        idx = if data.bin(row, *feature) <= *bin {
                            *left
                        } else {
                            *right
                        };
                    }
                }
            }
        })
        .collect()
}
