//! LSTM and GRU cells with exact single-step gradients.
//!
//! Gate pre-activations are stacked into one `(G·H) × I` input matrix and
//! one `(G·H) × H` recurrent matrix per cell. LSTM gate order is
//! input, forget, candidate, output; GRU order is update, reset, candidate.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Lstm,
    Gru,
}

impl CellKind {
    pub fn gates(self) -> usize {
        match self {
            CellKind::Lstm => 4,
            CellKind::Gru => 3,
        }
    }
}

/// Weights of one recurrent layer. Also used as a gradient accumulator.
#[derive(Debug, Clone)]
pub(crate) struct CellParams {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

impl CellParams {
    /// Glorot-uniform weights, zero bias, forget-gate bias of 1 for LSTM.
    pub fn init(kind: CellKind, input: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let rows = kind.gates() * hidden;
        let w_limit = (6.0 / (input + rows) as f64).sqrt();
        let u_limit = (6.0 / (hidden + rows) as f64).sqrt();
        let w = Array2::from_shape_fn((rows, input), |_| rng.gen_range(-w_limit..w_limit));
        let u = Array2::from_shape_fn((rows, hidden), |_| rng.gen_range(-u_limit..u_limit));
        let mut b = Array1::zeros(rows);
        if kind == CellKind::Lstm {
            b.slice_mut(ndarray::s![hidden..2 * hidden]).fill(1.0);
        }
        Self { w, u, b }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    pub fn hidden(&self) -> usize {
        self.u.ncols()
    }
}

/// Values saved by a forward step for the backward pass.
#[derive(Debug, Clone)]
pub(crate) enum StepCache {
    Lstm {
        x: Array1<f64>,
        h_prev: Array1<f64>,
        c_prev: Array1<f64>,
        i: Array1<f64>,
        f: Array1<f64>,
        g: Array1<f64>,
        o: Array1<f64>,
        tanh_c: Array1<f64>,
    },
    Gru {
        x: Array1<f64>,
        h_prev: Array1<f64>,
        z: Array1<f64>,
        r: Array1<f64>,
        n: Array1<f64>,
        uh_n: Array1<f64>,
    },
}

/// Output of a forward step: hidden state, cell state, cache.
pub(crate) type StepOutput = (Array1<f64>, Array1<f64>, StepCache);

/// Gradients leaving a backward step: input, previous hidden, previous cell.
pub(crate) type StepGrads = (Array1<f64>, Array1<f64>, Array1<f64>);

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// `acc += a ⊗ b`.
fn add_outer(acc: &mut Array2<f64>, a: &Array1<f64>, b: &Array1<f64>) {
    for (k, mut row) in acc.outer_iter_mut().enumerate() {
        row.scaled_add(a[k], b);
    }
}

pub(crate) fn step(
    kind: CellKind,
    p: &CellParams,
    x: ArrayView1<'_, f64>,
    h_prev: &Array1<f64>,
    c_prev: &Array1<f64>,
) -> StepOutput {
    let h = p.hidden();
    match kind {
        CellKind::Lstm => {
            let z = p.w.dot(&x) + p.u.dot(h_prev) + &p.b;
            let mut i = Array1::zeros(h);
            let mut f = Array1::zeros(h);
            let mut g = Array1::zeros(h);
            let mut o = Array1::zeros(h);
            let mut c = Array1::zeros(h);
            let mut tanh_c = Array1::zeros(h);
            let mut h_new = Array1::zeros(h);
            for k in 0..h {
                i[k] = sigmoid(z[k]);
                f[k] = sigmoid(z[h + k]);
                g[k] = z[2 * h + k].tanh();
                o[k] = sigmoid(z[3 * h + k]);
                c[k] = f[k] * c_prev[k] + i[k] * g[k];
                tanh_c[k] = c[k].tanh();
                h_new[k] = o[k] * tanh_c[k];
            }
            let cache = StepCache::Lstm {
                x: x.to_owned(),
                h_prev: h_prev.clone(),
                c_prev: c_prev.clone(),
                i,
                f,
                g,
                o,
                tanh_c,
            };
            (h_new, c, cache)
        }
        CellKind::Gru => {
            let zx = p.w.dot(&x) + &p.b;
            let zh = p.u.dot(h_prev);
            let mut z = Array1::zeros(h);
            let mut r = Array1::zeros(h);
            let mut n = Array1::zeros(h);
            let mut uh_n = Array1::zeros(h);
            let mut h_new = Array1::zeros(h);
            for k in 0..h {
                z[k] = sigmoid(zx[k] + zh[k]);
                r[k] = sigmoid(zx[h + k] + zh[h + k]);
                uh_n[k] = zh[2 * h + k];
                n[k] = (zx[2 * h + k] + r[k] * uh_n[k]).tanh();
                h_new[k] = z[k] * h_prev[k] + (1.0 - z[k]) * n[k];
            }
            let cache = StepCache::Gru {
                x: x.to_owned(),
                h_prev: h_prev.clone(),
                z,
                r,
                n,
                uh_n,
            };
            (h_new, Array1::zeros(h), cache)
        }
    }
}

/// Backpropagate one step. `dh` and `dc` are the gradients reaching this
/// step's hidden and cell state; parameter gradients accumulate into `grads`.
pub(crate) fn backward(
    p: &CellParams,
    cache: &StepCache,
    dh: &Array1<f64>,
    dc: &Array1<f64>,
    grads: &mut CellParams,
) -> StepGrads {
    let h = p.hidden();
    match cache {
        StepCache::Lstm {
            x,
            h_prev,
            c_prev,
            i,
            f,
            g,
            o,
            tanh_c,
        } => {
            let mut dz = Array1::zeros(4 * h);
            let mut dc_prev = Array1::zeros(h);
            for k in 0..h {
                let dc_t = dc[k] + dh[k] * o[k] * (1.0 - tanh_c[k] * tanh_c[k]);
                dz[k] = dc_t * g[k] * i[k] * (1.0 - i[k]);
                dz[h + k] = dc_t * c_prev[k] * f[k] * (1.0 - f[k]);
                dz[2 * h + k] = dc_t * i[k] * (1.0 - g[k] * g[k]);
                dz[3 * h + k] = dh[k] * tanh_c[k] * o[k] * (1.0 - o[k]);
                dc_prev[k] = dc_t * f[k];
            }
            add_outer(&mut grads.w, &dz, x);
            add_outer(&mut grads.u, &dz, h_prev);
            grads.b += &dz;
            let dx = p.w.t().dot(&dz);
            let dh_prev = p.u.t().dot(&dz);
            (dx, dh_prev, dc_prev)
        }
        StepCache::Gru {
            x,
            h_prev,
            z,
            r,
            n,
            uh_n,
        } => {
            let mut dzx = Array1::zeros(3 * h);
            let mut dzh = Array1::zeros(3 * h);
            let mut dh_direct = Array1::zeros(h);
            for k in 0..h {
                let dn = dh[k] * (1.0 - z[k]);
                let dan = dn * (1.0 - n[k] * n[k]);
                let daz = dh[k] * (h_prev[k] - n[k]) * z[k] * (1.0 - z[k]);
                let dar = dan * uh_n[k] * r[k] * (1.0 - r[k]);
                dzx[k] = daz;
                dzx[h + k] = dar;
                dzx[2 * h + k] = dan;
                dzh[k] = daz;
                dzh[h + k] = dar;
                dzh[2 * h + k] = dan * r[k];
                dh_direct[k] = dh[k] * z[k];
            }
            add_outer(&mut grads.w, &dzx, x);
            add_outer(&mut grads.u, &dzh, h_prev);
            grads.b += &dzx;
            let dx = p.w.t().dot(&dzx);
            let dh_prev = dh_direct + p.u.t().dot(&dzh);
            (dx, dh_prev, Array1::zeros(h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    /// Scalar loss: sum of the hidden state after one step.
    fn loss(kind: CellKind, p: &CellParams, x: &Array1<f64>, h0: &Array1<f64>, c0: &Array1<f64>) -> f64 {
        let (h, c, _) = step(kind, p, x.view(), h0, c0);
        h.sum() + if kind == CellKind::Lstm { 0.5 * c.sum() } else { 0.0 }
    }

    fn check_gradients(kind: CellKind) {
        let mut rng = StdRng::seed_from_u64(7);
        let p = CellParams::init(kind, 3, 2, &mut rng);
        let x = array![0.3, -0.2, 0.8];
        let h0 = array![0.1, -0.4];
        let c0 = array![0.2, 0.05];

        let (_, _, cache) = step(kind, &p, x.view(), &h0, &c0);
        let mut grads = p.zeros_like();
        let dh = Array1::ones(2);
        let dc = if kind == CellKind::Lstm {
            Array1::from_elem(2, 0.5)
        } else {
            Array1::zeros(2)
        };
        let (dx, dh_prev, _) = backward(&p, &cache, &dh, &dc, &mut grads);

        let eps = 1e-6;
        for (r, c) in [(0, 0), (1, 2), (p.w.nrows() - 1, 1)] {
            let mut plus = p.clone();
            plus.w[[r, c]] += eps;
            let mut minus = p.clone();
            minus.w[[r, c]] -= eps;
            let numeric = (loss(kind, &plus, &x, &h0, &c0) - loss(kind, &minus, &x, &h0, &c0)) / (2.0 * eps);
            assert!((numeric - grads.w[[r, c]]).abs() < 1e-6, "dW[{r},{c}]");
        }
        for r in [0, p.u.nrows() - 1] {
            let mut plus = p.clone();
            plus.u[[r, 1]] += eps;
            let mut minus = p.clone();
            minus.u[[r, 1]] -= eps;
            let numeric = (loss(kind, &plus, &x, &h0, &c0) - loss(kind, &minus, &x, &h0, &c0)) / (2.0 * eps);
            assert!((numeric - grads.u[[r, 1]]).abs() < 1e-6, "dU[{r},1]");
        }
        for k in 0..3 {
            let mut xp = x.clone();
            xp[k] += eps;
            let mut xm = x.clone();
            xm[k] -= eps;
            let numeric = (loss(kind, &p, &xp, &h0, &c0) - loss(kind, &p, &xm, &h0, &c0)) / (2.0 * eps);
            assert!((numeric - dx[k]).abs() < 1e-6, "dx[{k}]");
        }
        for k in 0..2 {
            let mut hp = h0.clone();
            hp[k] += eps;
            let mut hm = h0.clone();
            hm[k] -= eps;
            let numeric = (loss(kind, &p, &x, &hp, &c0) - loss(kind, &p, &x, &hm, &c0)) / (2.0 * eps);
            assert!((numeric - dh_prev[k]).abs() < 1e-6, "dh_prev[{k}]");
        }
    }

    #[test]
    fn lstm_gradients_match_finite_differences() {
        check_gradients(CellKind::Lstm);
    }

    #[test]
    fn gru_gradients_match_finite_differences() {
        check_gradients(CellKind::Gru);
    }

    #[test]
    fn lstm_forget_bias_starts_at_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = CellParams::init(CellKind::Lstm, 2, 3, &mut rng);
        assert_eq!(p.b.len(), 12);
        assert!(p.b.slice(ndarray::s![3..6]).iter().all(|v| *v == 1.0));
        assert!(p.b.slice(ndarray::s![0..3]).iter().all(|v| *v == 0.0));
    }
}
