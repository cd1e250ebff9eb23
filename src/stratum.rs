//! Strata (layers).
//!
//! A `Stratum` is one layer of a `Network`. It owns its cached response (`z`, or
//! `f(z)` once activated), its error signal (`dL/dz`) and, for parametric
//! variants, a weight matrix, a gradient accumulator of the same shape and a
//! `Strategy` that turns the accumulated gradient into a weight update.
//!
//! Variants:
//! - dense: `f(W [1; x])` with the build's activation policy
//! - logits: `W [1; x]`, unnormalized class scores
//! - softmax: parameter-free terminal stratum producing class probabilities and
//!   the negative log-likelihood loss
//!
//! The per-example protocol driven by the network is:
//!
//! 1. `forward` on every stratum, input to output
//! 2. `compute_loss` on the terminal stratum (seeds its error signal)
//! 3. output to input: `propagate_error` into the predecessor, then
//!    `accumulate_gradient` with this stratum's input
//! 4. once per pass: `apply_strategy`
//!
//! Shape mismatches on this path are programmer error and panic.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::{Activation, Matrix, Result, Shape, Strategy, StrategyKind};

/// Loss reported in place of a non-finite negative log-likelihood.
pub const LOSS_SENTINEL: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StratumKind {
    Dense,
    Logits,
    Softmax,
}

#[derive(Debug, Clone)]
struct Parameters {
    /// Row-major `(nodes, inputs + 1)`; column 0 is the bias.
    weights: Matrix,
    gradient: Matrix,
    strategy: Strategy,
}

impl Parameters {
    fn new(shape: Shape, strategy: StrategyKind) -> Result<Self> {
        let rows = shape.nodes();
        let cols = shape.input_width() + 1;
        Ok(Self {
            weights: Matrix::zeros(rows, cols),
            gradient: Matrix::zeros(rows, cols),
            strategy: strategy.build(rows, cols)?,
        })
    }

    /// Glorot/Xavier uniform over the whole matrix, bias column included.
    fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let fan_in = self.weights.cols() as f64;
        let fan_out = self.weights.rows() as f64;
        let r = (6.0 / (fan_in + fan_out)).sqrt();
        let dist = Uniform::new_inclusive(-r, r);
        for w in self.weights.as_mut_slice() {
            *w = dist.sample(rng);
        }
        self.gradient.zero();
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Dense {
        params: Parameters,
        activation: Activation,
        activated: bool,
    },
    Logits {
        params: Parameters,
    },
    Softmax {
        probabilities: Vec<f64>,
        guess: usize,
        /// The last `compute_loss` substituted `LOSS_SENTINEL` for a non-finite value.
        clamped: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Stratum {
    id: usize,
    name: &'static str,
    shape: Shape,
    response: Vec<f64>,
    error_signal: Vec<f64>,
    frozen: bool,
    kind: Kind,
}

impl Stratum {
    /// Hidden stratum: `f(W [1; x])`.
    pub fn dense(
        id: usize,
        shape: Shape,
        activation: Activation,
        strategy: StrategyKind,
    ) -> Result<Self> {
        let params = Parameters::new(shape, strategy)?;
        Ok(Self::with_kind(
            id,
            "dense",
            shape,
            false,
            Kind::Dense {
                params,
                activation,
                activated: false,
            },
        ))
    }

    /// Class-score stratum: `W [1; x]`, no activation.
    pub fn logits(id: usize, shape: Shape, strategy: StrategyKind) -> Result<Self> {
        let params = Parameters::new(shape, strategy)?;
        Ok(Self::with_kind(
            id,
            "logits",
            shape,
            false,
            Kind::Logits { params },
        ))
    }

    /// Terminal softmax / maximum-likelihood stratum over `classes` logits.
    pub fn softmax(id: usize, classes: usize) -> Result<Self> {
        let shape = Shape::new(classes, classes)?;
        Ok(Self::with_kind(
            id,
            "softmax",
            shape,
            true,
            Kind::Softmax {
                probabilities: vec![0.0; shape.len()],
                guess: 0,
                clamped: false,
            },
        ))
    }

    fn with_kind(id: usize, name: &'static str, shape: Shape, frozen: bool, kind: Kind) -> Self {
        Self {
            id,
            name,
            shape,
            response: vec![0.0; shape.len()],
            error_signal: vec![0.0; shape.len()],
            frozen,
            kind,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.shape.nodes()
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.shape.input_width()
    }

    pub fn kind(&self) -> StratumKind {
        match self.kind {
            Kind::Dense { .. } => StratumKind::Dense,
            Kind::Logits { .. } => StratumKind::Logits,
            Kind::Softmax { .. } => StratumKind::Softmax,
        }
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Exclude this stratum's parameters from accumulation and updates.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn thaw(&mut self) {
        self.frozen = false;
    }

    /// Response of the most recent forward pass (post-activation for dense strata).
    #[inline]
    pub fn response(&self) -> &[f64] {
        &self.response[..self.shape.nodes()]
    }

    /// `dL/dz` from the most recent backward pass.
    #[inline]
    pub fn error_signal(&self) -> &[f64] {
        &self.error_signal[..self.shape.nodes()]
    }

    pub fn probabilities(&self) -> Option<&[f64]> {
        match &self.kind {
            Kind::Softmax { probabilities, .. } => Some(&probabilities[..self.shape.nodes()]),
            _ => None,
        }
    }

    pub fn guess(&self) -> Option<usize> {
        match self.kind {
            Kind::Softmax { guess, .. } => Some(guess),
            _ => None,
        }
    }

    /// Whether the last `compute_loss` replaced a non-finite loss with `LOSS_SENTINEL`.
    ///
    /// Always `false` for strata other than the softmax terminal.
    pub fn loss_clamped(&self) -> bool {
        matches!(self.kind, Kind::Softmax { clamped: true, .. })
    }

    pub fn weights(&self) -> Option<&Matrix> {
        self.params().map(|p| &p.weights)
    }

    pub fn weights_mut(&mut self) -> Option<&mut Matrix> {
        self.params_mut().map(|p| &mut p.weights)
    }

    /// Gradient accumulated since the last update.
    pub fn gradient(&self) -> Option<&Matrix> {
        self.params().map(|p| &p.gradient)
    }

    pub fn strategy(&self) -> Option<&Strategy> {
        self.params().map(|p| &p.strategy)
    }

    fn params(&self) -> Option<&Parameters> {
        match &self.kind {
            Kind::Dense { params, .. } | Kind::Logits { params } => Some(params),
            Kind::Softmax { .. } => None,
        }
    }

    fn params_mut(&mut self) -> Option<&mut Parameters> {
        match &mut self.kind {
            Kind::Dense { params, .. } | Kind::Logits { params } => Some(params),
            Kind::Softmax { .. } => None,
        }
    }

    /// Number of learnable parameters (0 for the softmax terminal).
    pub fn trainable_parameters(&self) -> usize {
        self.params().map_or(0, |p| p.weights.len())
    }

    /// Randomize learnable parameters and clear the gradient accumulator.
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if let Some(params) = self.params_mut() {
            params.initialize(rng);
        }
        self.response.fill(0.0);
        self.error_signal.fill(0.0);
    }

    /// Forward pass for a single example.
    ///
    /// Caches the response for the following backward pass and returns it; the
    /// softmax terminal returns its probability distribution instead.
    ///
    /// Shape contract: `input.len() == self.input_width()`.
    pub fn forward(&mut self, input: &[f64], activate: bool) -> &[f64] {
        assert_eq!(
            input.len(),
            self.shape.input_width(),
            "{} stratum {}: input len {} does not match input_width {}",
            self.name,
            self.id,
            input.len(),
            self.shape.input_width()
        );

        let nodes = self.shape.nodes();
        let response = &mut self.response[..nodes];

        match &mut self.kind {
            Kind::Dense {
                params,
                activation,
                activated,
            } => {
                params.weights.affine_into(input, response);
                if activate {
                    for z in response.iter_mut() {
                        *z = activation.forward(*z);
                    }
                }
                *activated = activate;
                response
            }
            Kind::Logits { params } => {
                params.weights.affine_into(input, response);
                response
            }
            Kind::Softmax {
                probabilities,
                guess,
                ..
            } => {
                response.copy_from_slice(input);
                let probabilities = &mut probabilities[..nodes];
                *guess = softmax_into(response, probabilities);
                probabilities
            }
        }
    }

    /// Negative log-probability of `label`; also seeds `error_signal = p - onehot(label)`.
    ///
    /// Only valid on the softmax terminal, after `forward`. Non-finite losses are
    /// reported as `LOSS_SENTINEL` and flagged through `loss_clamped`.
    pub fn compute_loss(&mut self, label: usize) -> f64 {
        let nodes = self.shape.nodes();
        let Kind::Softmax {
            probabilities,
            clamped,
            ..
        } = &mut self.kind
        else {
            panic!(
                "loss requested from {} stratum {}; only the softmax terminal has one",
                self.name, self.id
            );
        };
        assert!(
            label < nodes,
            "label {label} out of range for {nodes} classes"
        );

        let logits = &self.response[..nodes];
        let raw = log_sum_exp(logits) - logits[label];
        *clamped = !raw.is_finite();
        let loss = if *clamped { LOSS_SENTINEL } else { raw };

        let delta = &mut self.error_signal[..nodes];
        for (i, d) in delta.iter_mut().enumerate() {
            let target = if i == label { 1.0 } else { 0.0 };
            *d = probabilities[i] - target;
        }
        if delta.iter().any(|d| !d.is_finite()) {
            delta.fill(0.0);
        }

        loss
    }

    /// Write `dL/dz` for `predecessor` from this stratum's error signal.
    ///
    /// Must run after this stratum's own error signal is populated.
    pub fn propagate_error(&self, predecessor: &mut Stratum) {
        let pred_nodes = predecessor.shape.nodes();
        assert_eq!(
            pred_nodes,
            self.shape.input_width(),
            "predecessor {} has {pred_nodes} nodes, stratum {} expects {} inputs",
            predecessor.id,
            self.id,
            self.shape.input_width()
        );

        let delta = &self.error_signal[..self.shape.nodes()];
        let out = &mut predecessor.error_signal[..pred_nodes];
        match &self.kind {
            Kind::Dense { params, .. } | Kind::Logits { params } => {
                params.weights.transpose_mult_into(delta, out);
            }
            Kind::Softmax { .. } => out.copy_from_slice(delta),
        }

        predecessor.apply_activation_derivative();
    }

    /// Chain `dL/dy` (just written into the error signal) through `dy/dz`.
    fn apply_activation_derivative(&mut self) {
        let nodes = self.shape.nodes();
        if let Kind::Dense {
            activation,
            activated: true,
            ..
        } = self.kind
        {
            for (d, &y) in self.error_signal[..nodes]
                .iter_mut()
                .zip(&self.response[..nodes])
            {
                *d *= activation.grad_from_output(y);
            }
        }
    }

    /// Add `error_signal · transpose([1; input])` into the gradient accumulator.
    pub fn accumulate_gradient(&mut self, input: &[f64]) {
        if self.frozen {
            return;
        }
        let nodes = self.shape.nodes();
        match &mut self.kind {
            Kind::Dense { params, .. } | Kind::Logits { params } => {
                params.gradient.add_outer(&self.error_signal[..nodes], input);
            }
            Kind::Softmax { .. } => {}
        }
    }

    /// Update parameters from the accumulated gradient, then reset the accumulator.
    pub fn apply_strategy(&mut self) {
        if self.frozen {
            self.discard_gradient();
            return;
        }
        if let Some(params) = self.params_mut() {
            let Parameters {
                weights,
                gradient,
                strategy,
            } = params;
            strategy.apply(weights, gradient);
        }
    }

    /// Drop the accumulated gradient without updating.
    pub fn discard_gradient(&mut self) {
        if let Some(params) = self.params_mut() {
            params.gradient.zero();
        }
    }
}

#[inline]
fn log_sum_exp(xs: &[f64]) -> f64 {
    let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum_exp: f64 = xs.iter().map(|&x| (x - max_x).exp()).sum();
    max_x + sum_exp.ln()
}

/// Max-subtracted softmax of `logits` into `out`; returns the argmax.
fn softmax_into(logits: &[f64], out: &mut [f64]) -> usize {
    debug_assert_eq!(logits.len(), out.len());

    let mut guess = 0;
    for (i, &z) in logits.iter().enumerate() {
        if z > logits[guess] {
            guess = i;
        }
    }
    let max_z = logits[guess];

    let mut sum = 0.0;
    for (p, &z) in out.iter_mut().zip(logits) {
        *p = (z - max_z).exp();
        sum += *p;
    }
    let inv = 1.0 / sum;
    for p in out.iter_mut() {
        *p *= inv;
    }
    guess
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dense(nodes: usize, inputs: usize, activation: Activation) -> Stratum {
        Stratum::dense(
            0,
            Shape::new(nodes, inputs).unwrap(),
            activation,
            StrategyKind::rprop(),
        )
        .unwrap()
    }

    #[test]
    fn softmax_is_a_distribution_for_any_finite_logits() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = Stratum::softmax(0, 5).unwrap();

        for scale in [1e-3, 1.0, 50.0, 700.0, 1e6] {
            for _ in 0..50 {
                let logits: Vec<f64> = (0..5).map(|_| rng.gen_range(-scale..scale)).collect();
                let p = s.forward(&logits, true).to_vec();
                let sum: f64 = p.iter().sum();
                assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-9);
                assert!(p.iter().all(|&v| v >= 0.0 && v.is_finite()));

                let guess = s.guess().unwrap();
                assert!(logits.iter().all(|&z| z <= logits[guess]));
            }
        }
    }

    #[test]
    fn loss_is_negative_log_probability_and_seeds_error_signal() {
        let mut s = Stratum::softmax(0, 3).unwrap();
        let p = s.forward(&[1.0, 2.0, 0.5], true).to_vec();
        let loss = s.compute_loss(1);
        assert_abs_diff_eq!(loss, -p[1].ln(), epsilon = 1e-12);

        let delta = s.error_signal();
        assert_abs_diff_eq!(delta[0], p[0], epsilon = 1e-12);
        assert_abs_diff_eq!(delta[1], p[1] - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(delta[2], p[2], epsilon = 1e-12);
    }

    #[test]
    fn extreme_logits_stay_finite_without_clamping() {
        let mut s = Stratum::softmax(0, 2).unwrap();
        s.forward(&[1000.0, -1000.0], true);
        let loss = s.compute_loss(1);
        assert_abs_diff_eq!(loss, 2000.0, epsilon = 1e-9);
        assert!(!s.loss_clamped());

        // Finite losses above the sentinel value are reported as they are.
        s.forward(&[0.0, 2e6], true);
        let loss = s.compute_loss(0);
        assert_eq!(loss, 2e6);
        assert!(loss > LOSS_SENTINEL);
        assert!(!s.loss_clamped());
    }

    #[test]
    fn non_finite_loss_is_clamped_and_error_signal_zeroed() {
        let mut s = Stratum::softmax(0, 3).unwrap();
        s.forward(&[f64::NAN, 0.0, 1.0], true);
        assert_eq!(s.compute_loss(2), LOSS_SENTINEL);
        assert!(s.loss_clamped());
        assert!(s.error_signal().iter().all(|&d| d == 0.0));

        s.forward(&[f64::INFINITY, 0.0, 1.0], true);
        assert_eq!(s.compute_loss(1), LOSS_SENTINEL);
        assert!(s.loss_clamped());

        // The flag follows the most recent loss.
        s.forward(&[0.0, 0.0, 1.0], true);
        assert!(s.compute_loss(1).is_finite());
        assert!(!s.loss_clamped());
    }

    #[test]
    #[should_panic]
    fn loss_on_hidden_stratum_panics() {
        let mut d = dense(2, 2, Activation::Sigmoid);
        d.forward(&[0.0, 1.0], true);
        d.compute_loss(0);
    }

    #[test]
    fn softmax_passes_error_signal_through_to_logits() {
        let mut logits =
            Stratum::logits(0, Shape::new(3, 2).unwrap(), StrategyKind::rprop()).unwrap();
        let mut soft = Stratum::softmax(1, 3).unwrap();
        logits.initialize(&mut StdRng::seed_from_u64(0));

        let z = logits.forward(&[0.3, -0.1], true).to_vec();
        soft.forward(&z, true);
        soft.compute_loss(0);
        soft.propagate_error(&mut logits);

        assert_eq!(logits.error_signal(), soft.error_signal());
    }

    #[test]
    fn dense_forward_and_backward_by_hand() {
        let mut d = dense(2, 2, Activation::Identity);
        d.weights_mut()
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[0.5, 1.0, 2.0, -1.0, 3.0, -4.0]);

        assert_eq!(d.forward(&[1.0, 1.0], true), &[3.5, -2.0]);

        // Successor with identity weights routes its error straight back.
        let mut next =
            Stratum::logits(1, Shape::new(2, 2).unwrap(), StrategyKind::rprop()).unwrap();
        next.weights_mut()
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        next.error_signal[..2].copy_from_slice(&[0.25, -1.0]);
        next.propagate_error(&mut d);
        assert_eq!(d.error_signal(), &[0.25, -1.0]);

        d.accumulate_gradient(&[1.0, 2.0]);
        assert_eq!(
            d.gradient().unwrap().as_slice(),
            &[0.25, 0.25, 0.5, -1.0, -1.0, -2.0]
        );
    }

    #[test]
    fn sigmoid_derivative_is_applied_on_propagation() {
        let mut d = dense(1, 1, Activation::Sigmoid);
        d.weights_mut()
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[0.0, 0.0]);
        d.forward(&[3.0], true);
        assert_abs_diff_eq!(d.response()[0], 0.5, epsilon = 1e-12);

        let mut next =
            Stratum::logits(1, Shape::new(1, 1).unwrap(), StrategyKind::rprop()).unwrap();
        next.weights_mut()
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[0.0, 2.0]);
        next.error_signal[0] = 1.0;
        next.propagate_error(&mut d);

        // 2.0 * sigmoid'(0) = 2.0 * 0.25
        assert_abs_diff_eq!(d.error_signal()[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn glorot_range_and_zeroed_accumulator() {
        let mut d = dense(8, 4, Activation::Tanh);
        d.initialize(&mut StdRng::seed_from_u64(11));

        let r = (6.0_f64 / (5.0 + 8.0)).sqrt();
        let w = d.weights().unwrap().as_slice();
        assert!(w.iter().all(|&v| v.abs() <= r));
        assert!(w.iter().any(|&v| v != 0.0));
        assert!(d.gradient().unwrap().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn trainable_parameter_counts() {
        assert_eq!(dense(8, 4, Activation::Sigmoid).trainable_parameters(), 8 * 5);
        assert_eq!(Stratum::softmax(0, 3).unwrap().trainable_parameters(), 0);
        assert!(Stratum::softmax(0, 3).unwrap().is_frozen());
    }

    #[test]
    fn frozen_stratum_neither_accumulates_nor_updates() {
        let mut d = dense(1, 1, Activation::Identity);
        d.initialize(&mut StdRng::seed_from_u64(1));
        let before = d.weights().unwrap().clone();

        d.freeze();
        d.forward(&[1.0], true);
        d.error_signal[0] = 1.0;
        d.accumulate_gradient(&[1.0]);
        d.apply_strategy();
        assert_eq!(d.weights().unwrap(), &before);
        assert!(d.gradient().unwrap().as_slice().iter().all(|&v| v == 0.0));

        d.thaw();
        d.accumulate_gradient(&[1.0]);
        d.apply_strategy();
        assert_ne!(d.weights().unwrap(), &before);
        assert!(d.gradient().unwrap().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn freezing_after_accumulation_drops_the_pending_gradient() {
        let mut d = dense(1, 1, Activation::Identity);
        d.initialize(&mut StdRng::seed_from_u64(2));
        let before = d.weights().unwrap().clone();

        d.forward(&[1.0], true);
        d.error_signal[0] = 1.0;
        d.accumulate_gradient(&[1.0]);
        assert!(d.gradient().unwrap().as_slice().iter().any(|&v| v != 0.0));

        d.freeze();
        d.apply_strategy();
        assert_eq!(d.weights().unwrap(), &before);
        assert!(d.gradient().unwrap().as_slice().iter().all(|&v| v == 0.0));

        // Thawing must not resurrect the stale gradient.
        d.thaw();
        d.apply_strategy();
        assert_eq!(d.weights().unwrap(), &before);
    }
}
