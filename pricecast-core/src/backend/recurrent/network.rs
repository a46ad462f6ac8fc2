//! Two stacked recurrent layers, dropout after each, dense scalar head.

use ndarray::{Array1, ArrayView2, Dimension, Zip};
use rand::rngs::StdRng;
use rand::Rng;

use super::cell::{backward, step, CellKind, CellParams, StepCache};

/// Trainable parameters. The same shape holds gradients and Adam moments.
#[derive(Debug, Clone)]
pub(crate) struct NetParams {
    pub layers: [CellParams; 2],
    pub head_w: Array1<f64>,
    pub head_b: f64,
}

impl NetParams {
    pub fn zeros_like(&self) -> Self {
        Self {
            layers: [self.layers[0].zeros_like(), self.layers[1].zeros_like()],
            head_w: Array1::zeros(self.head_w.raw_dim()),
            head_b: 0.0,
        }
    }
}

/// Everything a training forward pass keeps for backpropagation.
pub(crate) struct Trace {
    lower: Vec<StepCache>,
    lower_masks: Vec<Array1<f64>>,
    upper: Vec<StepCache>,
    head_mask: Array1<f64>,
    head_input: Array1<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecurrentNet {
    kind: CellKind,
    dropout: f64,
    pub params: NetParams,
}

impl RecurrentNet {
    pub fn new(kind: CellKind, input: usize, hidden: usize, dropout: f64, rng: &mut StdRng) -> Self {
        let lower = CellParams::init(kind, input, hidden, rng);
        let upper = CellParams::init(kind, hidden, hidden, rng);
        let limit = (6.0 / (hidden + 1) as f64).sqrt();
        let head_w = Array1::from_shape_fn(hidden, |_| rng.gen_range(-limit..limit));
        Self {
            kind,
            dropout,
            params: NetParams {
                layers: [lower, upper],
                head_w,
                head_b: 0.0,
            },
        }
    }

    fn hidden(&self) -> usize {
        self.params.head_w.len()
    }

    fn mask(&self, rng: &mut StdRng) -> Array1<f64> {
        let keep = 1.0 - self.dropout;
        if self.dropout <= 0.0 {
            return Array1::ones(self.hidden());
        }
        Array1::from_shape_fn(self.hidden(), |_| {
            if rng.gen::<f64>() < self.dropout {
                0.0
            } else {
                1.0 / keep
            }
        })
    }

    /// Inference: dropout disabled.
    pub fn predict(&self, window: ArrayView2<'_, f64>) -> f64 {
        let h = self.hidden();
        let [lower, upper] = &self.params.layers;
        let (mut h1, mut c1) = (Array1::zeros(h), Array1::zeros(h));
        let (mut h2, mut c2) = (Array1::zeros(h), Array1::zeros(h));
        for row in window.rows() {
            let (nh1, nc1, _) = step(self.kind, lower, row, &h1, &c1);
            let (nh2, nc2, _) = step(self.kind, upper, nh1.view(), &h2, &c2);
            h1 = nh1;
            c1 = nc1;
            h2 = nh2;
            c2 = nc2;
        }
        self.params.head_w.dot(&h2) + self.params.head_b
    }

    pub fn forward_train(&self, window: ArrayView2<'_, f64>, rng: &mut StdRng) -> (f64, Trace) {
        let h = self.hidden();
        let [lower, upper] = &self.params.layers;

        let mut lower_caches = Vec::with_capacity(window.nrows());
        let mut lower_masks = Vec::with_capacity(window.nrows());
        let mut lower_out = Vec::with_capacity(window.nrows());
        let (mut h1, mut c1) = (Array1::zeros(h), Array1::zeros(h));
        for row in window.rows() {
            let (nh, nc, cache) = step(self.kind, lower, row, &h1, &c1);
            let mask = self.mask(rng);
            lower_out.push(&nh * &mask);
            lower_caches.push(cache);
            lower_masks.push(mask);
            h1 = nh;
            c1 = nc;
        }

        let mut upper_caches = Vec::with_capacity(window.nrows());
        let (mut h2, mut c2) = (Array1::zeros(h), Array1::zeros(h));
        for input in &lower_out {
            let (nh, nc, cache) = step(self.kind, upper, input.view(), &h2, &c2);
            upper_caches.push(cache);
            h2 = nh;
            c2 = nc;
        }

        let head_mask = self.mask(rng);
        let head_input = &h2 * &head_mask;
        let y = self.params.head_w.dot(&head_input) + self.params.head_b;
        let trace = Trace {
            lower: lower_caches,
            lower_masks,
            upper: upper_caches,
            head_mask,
            head_input,
        };
        (y, trace)
    }

    /// Backpropagation through time for one sample; `dy` is dLoss/dOutput.
    pub fn backward(&self, trace: &Trace, dy: f64, grads: &mut NetParams) {
        let h = self.hidden();
        let [lower, upper] = &self.params.layers;
        let [g_lower, g_upper] = &mut grads.layers;

        grads.head_w.scaled_add(dy, &trace.head_input);
        grads.head_b += dy;

        let mut dh = &(&self.params.head_w * dy) * &trace.head_mask;
        let mut dc = Array1::zeros(h);
        let mut d_lower_out = vec![Array1::zeros(h); trace.upper.len()];
        for t in (0..trace.upper.len()).rev() {
            let (dx, dh_prev, dc_prev) = backward(upper, &trace.upper[t], &dh, &dc, g_upper);
            d_lower_out[t] = dx;
            dh = dh_prev;
            dc = dc_prev;
        }

        let mut dh = Array1::zeros(h);
        let mut dc = Array1::zeros(h);
        for t in (0..trace.lower.len()).rev() {
            let dh_total = &dh + &(&d_lower_out[t] * &trace.lower_masks[t]);
            let (_, dh_prev, dc_prev) = backward(lower, &trace.lower[t], &dh_total, &dc, g_lower);
            dh = dh_prev;
            dc = dc_prev;
        }
    }
}

/// Adam with bias correction folded into the step size.
pub(crate) struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: NetParams,
    v: NetParams,
}

impl Adam {
    pub fn new(learning_rate: f64, params: &NetParams) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m: params.zeros_like(),
            v: params.zeros_like(),
        }
    }

    pub fn step(&mut self, params: &mut NetParams, grads: &NetParams) {
        self.t += 1;
        let lr = self.learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt()
            / (1.0 - self.beta1.powi(self.t));
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        for l in 0..2 {
            let (p, g) = (&mut params.layers[l], &grads.layers[l]);
            let (m, v) = (&mut self.m.layers[l], &mut self.v.layers[l]);
            update(&mut p.w, &g.w, &mut m.w, &mut v.w, lr, b1, b2, eps);
            update(&mut p.u, &g.u, &mut m.u, &mut v.u, lr, b1, b2, eps);
            update(&mut p.b, &g.b, &mut m.b, &mut v.b, lr, b1, b2, eps);
        }
        update(
            &mut params.head_w,
            &grads.head_w,
            &mut self.m.head_w,
            &mut self.v.head_w,
            lr,
            b1,
            b2,
            eps,
        );
        let g = grads.head_b;
        self.m.head_b = b1 * self.m.head_b + (1.0 - b1) * g;
        self.v.head_b = b2 * self.v.head_b + (1.0 - b2) * g * g;
        params.head_b -= lr * self.m.head_b / (self.v.head_b.sqrt() + eps);
    }
}

#[allow(clippy::too_many_arguments)]
fn update<D: Dimension>(
    param: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    lr: f64,
    b1: f64,
    b2: f64,
    eps: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            *p -= lr * *m / (v.sqrt() + eps);
        });
}
