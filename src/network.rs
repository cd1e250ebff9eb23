use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sampling::validate_fraction;
use crate::{
    Dataset, Error, NetworkBuilder, Normalization, Result, StrategyKind, Stratum, StratumKind,
    TrainConfig,
};

/// A feed-forward classifier: an ordered sequence of strata ending in a softmax
/// terminal, plus the training settings that drive `Network::train`.
#[derive(Debug, Clone)]
pub struct Network {
    strata: Vec<Stratum>,
    input_width: usize,
    output_width: usize,
    trainable_weights: usize,

    pub(crate) config: TrainConfig,
    pub(crate) steps: usize,
    pub(crate) loss: f64,
    pub(crate) accuracy: f64,

    normalization: Option<Normalization>,
    /// Owned training RNG (subset sampling), seeded from the construction RNG.
    pub(crate) rng: StdRng,
    /// Normalized copy of the current example; the first stratum reads from here.
    input: Vec<f64>,
}

impl Network {
    /// Convenience constructor from a width list `{inputs, hidden.., outputs}`.
    ///
    /// Every hidden width becomes a dense stratum, the last width a logits
    /// stratum feeding the softmax terminal, all using `strategy`.
    pub fn from_widths(widths: &[usize], strategy: StrategyKind, seed: u64) -> Result<Self> {
        if widths.len() < 2 {
            return Err(Error::InvalidConfig(
                "widths must include input and output widths".to_owned(),
            ));
        }

        let mut b = NetworkBuilder::new(widths[0])?;
        for &w in &widths[1..widths.len() - 1] {
            b = b.add_dense_layer(w, strategy)?;
        }
        b.add_logits_layer(widths[widths.len() - 1], strategy)?
            .build_with_seed(seed)
    }

    /// Assemble a network from pre-built strata, initializing each with `rng`.
    ///
    /// Fails if the strata do not chain (`strata[i].input_width() ==
    /// strata[i - 1].nodes()`) or if the last one is not a softmax terminal.
    pub fn from_strata<R: Rng + ?Sized>(mut strata: Vec<Stratum>, rng: &mut R) -> Result<Self> {
        let (Some(first), Some(last)) = (strata.first(), strata.last()) else {
            return Err(Error::InvalidShape(
                "network must have at least one stratum".to_owned(),
            ));
        };
        if last.kind() != StratumKind::Softmax {
            return Err(Error::InvalidShape(format!(
                "terminal stratum must be softmax, got {}",
                last.name()
            )));
        }
        let input_width = first.input_width();
        let output_width = last.nodes();

        for (i, pair) in strata.windows(2).enumerate() {
            if pair[1].input_width() != pair[0].nodes() {
                return Err(Error::InvalidShape(format!(
                    "stratum {} expects {} inputs but stratum {} has {} nodes",
                    i + 1,
                    pair[1].input_width(),
                    i,
                    pair[0].nodes()
                )));
            }
        }
        if let Some(pos) = strata[..strata.len() - 1]
            .iter()
            .position(|s| s.kind() == StratumKind::Softmax)
        {
            return Err(Error::InvalidShape(format!(
                "softmax stratum {pos} must be the terminal stratum"
            )));
        }

        for s in strata.iter_mut() {
            s.initialize(rng);
        }
        let trainable_weights = strata.iter().map(Stratum::trainable_parameters).sum();

        debug!(
            "network built: in={input_width} out={output_width} strata={} \
             trainable={trainable_weights}",
            strata.len()
        );

        Ok(Self {
            strata,
            input_width,
            output_width,
            trainable_weights,
            config: TrainConfig::default(),
            steps: 0,
            loss: f64::NAN,
            accuracy: 0.0,
            normalization: None,
            rng: StdRng::seed_from_u64(rng.r#gen()),
            input: vec![0.0; input_width],
        })
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Total learnable parameters (weights and biases) across all strata.
    #[inline]
    pub fn trainable_weights(&self) -> usize {
        self.trainable_weights
    }

    #[inline]
    pub fn num_strata(&self) -> usize {
        self.strata.len()
    }

    pub fn strata(&self) -> &[Stratum] {
        &self.strata
    }

    pub fn stratum(&self, idx: usize) -> Option<&Stratum> {
        self.strata.get(idx)
    }

    pub fn stratum_mut(&mut self, idx: usize) -> Option<&mut Stratum> {
        self.strata.get_mut(idx)
    }

    /// Mean loss of the most recent training pass (NaN before training).
    #[inline]
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Fraction of rows classified correctly in the most recent training pass.
    #[inline]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Epochs trained so far, across all `train*` calls.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[inline]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrainConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Target mean loss at which training stops.
    pub fn set_halt(&mut self, loss: f64) {
        self.config.halt_loss = loss;
    }

    /// Also stop training once a pass classifies every row correctly.
    pub fn set_accuracy(&mut self) {
        self.config.halt_on_full_accuracy = true;
    }

    pub fn turn_off_accuracy(&mut self) {
        self.config.halt_on_full_accuracy = false;
    }

    /// Log a status line every `modulus` steps (0 disables it).
    pub fn set_keep_alive(&mut self, modulus: usize) {
        self.config.keep_alive = modulus;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.config.max_iterations = max_iterations;
    }

    /// Train on a fresh random `fraction` of the rows each epoch.
    pub fn set_sgd(&mut self, fraction: f64) -> Result<()> {
        validate_fraction(fraction)?;
        self.config.sgd_fraction = Some(fraction);
        Ok(())
    }

    /// Snapshot per-feature mean/std-dev from `data`; every later input is standardized.
    pub fn set_normalize(&mut self, data: &Dataset) -> Result<()> {
        if data.input_width() != self.input_width {
            return Err(Error::InvalidConfig(format!(
                "normalization data has input_width {}, network expects {}",
                data.input_width(),
                self.input_width
            )));
        }
        if data.is_empty() {
            return Err(Error::InvalidData(
                "normalization data must not be empty".to_owned(),
            ));
        }
        self.normalization = Some(Normalization::from_dataset(data));
        Ok(())
    }

    /// Forward pass for one example; returns the predicted class.
    ///
    /// Gradient accumulators are left untouched.
    ///
    /// Shape contract: `features.len() == self.input_width()`.
    pub fn compute(&mut self, features: &[f64]) -> usize {
        self.forward_row(features)
    }

    /// Class distribution from the most recent forward pass.
    pub fn probabilities(&self) -> &[f64] {
        self.terminal()
            .probabilities()
            .expect("terminal stratum must be softmax")
    }

    /// Apply every stratum's strategy to its accumulated gradient.
    pub fn update_weights(&mut self) {
        for s in self.strata.iter_mut() {
            s.apply_strategy();
        }
    }

    pub(crate) fn discard_gradients(&mut self) {
        for s in self.strata.iter_mut() {
            s.discard_gradient();
        }
    }

    fn terminal(&self) -> &Stratum {
        self.strata
            .last()
            .expect("network must have at least one stratum")
    }

    pub(crate) fn forward_row(&mut self, features: &[f64]) -> usize {
        assert_eq!(
            features.len(),
            self.input_width,
            "input len {} does not match network input_width {}",
            features.len(),
            self.input_width
        );

        match &self.normalization {
            Some(norm) => norm.apply(features, &mut self.input),
            None => self.input.copy_from_slice(features),
        }

        for idx in 0..self.strata.len() {
            if idx == 0 {
                self.strata[0].forward(&self.input, true);
            } else {
                // Borrow the previous response immutably and the current stratum mutably.
                let (left, right) = self.strata.split_at_mut(idx);
                right[0].forward(left[idx - 1].response(), true);
            }
        }

        self.terminal()
            .guess()
            .expect("terminal stratum must be softmax")
    }

    /// Loss for `label` on the last forward pass and whether it was clamped to
    /// `LOSS_SENTINEL`; gradients are left untouched.
    pub(crate) fn terminal_loss(&mut self, label: usize) -> (f64, bool) {
        let last = self.strata.len() - 1;
        let terminal = &mut self.strata[last];
        let loss = terminal.compute_loss(label);
        (loss, terminal.loss_clamped())
    }

    /// Loss for `label` on the last forward pass, then backprop into every accumulator.
    ///
    /// Must follow `forward_row` for the same example.
    ///
    /// A clamped row contributes nothing: its error signal is zero, and skipping it
    /// keeps non-finite responses out of the accumulators.
    pub(crate) fn backward_row(&mut self, label: usize) -> (f64, bool) {
        let scored = self.terminal_loss(label);
        if scored.1 {
            return scored;
        }

        for idx in (1..self.strata.len()).rev() {
            let (left, right) = self.strata.split_at_mut(idx);
            let current = &mut right[0];
            let predecessor = &mut left[idx - 1];
            current.propagate_error(predecessor);
            current.accumulate_gradient(predecessor.response());
        }
        self.strata[0].accumulate_gradient(&self.input);

        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, LOSS_SENTINEL, Shape};

    fn loss_at(net: &mut Network, input: &[f64], label: usize) -> f64 {
        net.forward_row(input);
        net.terminal_loss(label).0
    }

    fn assert_close(analytic: f64, numeric: f64, tol: f64) {
        let diff = (analytic - numeric).abs();
        assert!(
            diff <= tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let mut a = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 123).unwrap();
        let mut b = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 123).unwrap();

        let input = [0.3, -0.7];
        a.compute(&input);
        b.compute(&input);
        assert_eq!(a.probabilities(), b.probabilities());
    }

    #[test]
    fn accumulated_gradient_matches_finite_differences() {
        for activation in [
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::ReLU,
            Activation::Identity,
        ] {
            let mut net = NetworkBuilder::new(3)
                .unwrap()
                .activation(activation)
                .add_dense_layer(4, StrategyKind::rprop())
                .unwrap()
                .add_dense_layer(5, StrategyKind::adam())
                .unwrap()
                .add_logits_layer(3, StrategyKind::rprop())
                .unwrap()
                .build_with_seed(5)
                .unwrap();

            let input = [0.4, -1.2, 0.9];
            let label = 2;

            net.forward_row(&input);
            net.backward_row(label);

            let eps = 1e-6;
            if activation == Activation::ReLU {
                // Central differences are only valid away from the kink at 0.
                for s in &net.strata[..2] {
                    assert!(
                        s.response().iter().all(|&y| y == 0.0 || y > 1e-5),
                        "relu response too close to the kink: {:?}",
                        s.response()
                    );
                }
            }
            for l in 0..net.num_strata() {
                let Some(grad) = net.strata[l].gradient().map(|g| g.as_slice().to_vec()) else {
                    continue;
                };
                for (p, &analytic) in grad.iter().enumerate() {
                    let orig = net.strata[l].weights().unwrap().as_slice()[p];

                    net.strata[l].weights_mut().unwrap().as_mut_slice()[p] = orig + eps;
                    let loss_plus = loss_at(&mut net, &input, label);
                    net.strata[l].weights_mut().unwrap().as_mut_slice()[p] = orig - eps;
                    let loss_minus = loss_at(&mut net, &input, label);
                    net.strata[l].weights_mut().unwrap().as_mut_slice()[p] = orig;

                    let numeric = (loss_plus - loss_minus) / (2.0 * eps);
                    assert_close(analytic, numeric, 1e-4);
                }
            }
        }
    }

    #[test]
    fn gradients_accumulate_additively_over_examples() {
        let mut net = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 1).unwrap();

        net.forward_row(&[0.1, 0.2]);
        net.backward_row(0);
        let first = net.strata[0].gradient().unwrap().clone();

        net.forward_row(&[0.1, 0.2]);
        net.backward_row(0);
        let twice = net.strata[0].gradient().unwrap();

        for (a, b) in first.as_slice().iter().zip(twice.as_slice()) {
            assert!((2.0 * a - b).abs() < 1e-12);
        }

        net.discard_gradients();
        assert!(
            net.strata[0]
                .gradient()
                .unwrap()
                .as_slice()
                .iter()
                .all(|&v| v == 0.0)
        );
    }

    #[test]
    fn clamped_row_leaves_accumulators_untouched() {
        let mut net = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 6).unwrap();

        net.forward_row(&[f64::NAN, 0.5]);
        let (loss, clamped) = net.backward_row(1);
        assert!(clamped);
        assert_eq!(loss, LOSS_SENTINEL);
        for s in net.strata() {
            if let Some(g) = s.gradient() {
                assert!(g.as_slice().iter().all(|&v| v == 0.0));
            }
        }

        net.forward_row(&[0.1, 0.5]);
        let (loss, clamped) = net.backward_row(1);
        assert!(!clamped);
        assert!(loss.is_finite());
        assert!(
            net.strata[0]
                .gradient()
                .unwrap()
                .as_slice()
                .iter()
                .all(|v| v.is_finite())
        );
    }

    #[test]
    fn compute_returns_a_valid_class_for_declared_widths() {
        let mut rng = StdRng::seed_from_u64(17);
        for widths in [vec![4, 3], vec![4, 8, 3], vec![2, 5, 7, 6]] {
            let mut net = Network::from_widths(&widths, StrategyKind::adam(), 0).unwrap();
            assert_eq!(net.input_width(), widths[0]);
            assert_eq!(net.output_width(), *widths.last().unwrap());
            assert_eq!(net.num_strata(), widths.len());

            for _ in 0..20 {
                let x: Vec<f64> = (0..widths[0]).map(|_| rng.gen_range(-3.0..3.0)).collect();
                let class = net.compute(&x);
                assert!(class < net.output_width());
                assert_eq!(net.probabilities().len(), net.output_width());
            }
        }
    }

    #[test]
    fn trainable_weight_count_includes_biases() {
        let net = Network::from_widths(&[4, 8, 3], StrategyKind::rprop(), 0).unwrap();
        assert_eq!(net.trainable_weights(), 8 * (4 + 1) + 3 * (8 + 1));
    }

    #[test]
    fn from_strata_rejects_inconsistent_widths() {
        let mut rng = StdRng::seed_from_u64(0);
        let dense = Stratum::dense(
            0,
            Shape::new(5, 4).unwrap(),
            Activation::Sigmoid,
            StrategyKind::rprop(),
        )
        .unwrap();
        let logits = Stratum::logits(1, Shape::new(3, 6).unwrap(), StrategyKind::rprop()).unwrap();
        let softmax = Stratum::softmax(2, 3).unwrap();
        let err = Network::from_strata(vec![dense.clone(), logits, softmax.clone()], &mut rng);
        assert!(matches!(err, Err(Error::InvalidShape(_))));

        // Missing softmax terminal.
        let logits = Stratum::logits(1, Shape::new(3, 5).unwrap(), StrategyKind::rprop()).unwrap();
        assert!(Network::from_strata(vec![dense.clone(), logits.clone()], &mut rng).is_err());

        // Softmax in the middle.
        let early = Stratum::softmax(1, 5).unwrap();
        let logits_after =
            Stratum::logits(2, Shape::new(3, 5).unwrap(), StrategyKind::rprop()).unwrap();
        assert!(
            Network::from_strata(
                vec![dense.clone(), early, logits_after, softmax.clone()],
                &mut rng
            )
            .is_err()
        );

        assert!(Network::from_strata(Vec::new(), &mut rng).is_err());
        assert!(Network::from_strata(vec![dense, logits, softmax], &mut rng).is_ok());
    }

    #[test]
    fn width_list_must_be_complete_and_non_zero() {
        assert!(Network::from_widths(&[4], StrategyKind::rprop(), 0).is_err());
        assert!(Network::from_widths(&[4, 0, 3], StrategyKind::rprop(), 0).is_err());
        assert!(Network::from_widths(&[0, 3], StrategyKind::rprop(), 0).is_err());
    }

    #[test]
    fn normalization_standardizes_inputs() {
        let data = Dataset::from_rows(
            &[vec![1.0, 100.0], vec![3.0, 300.0], vec![5.0, 200.0]],
            &[0, 1, 0],
        )
        .unwrap();

        let mut normalized = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 4).unwrap();
        let mut raw = normalized.clone();
        normalized.set_normalize(&data).unwrap();

        let norm = normalized.normalization().unwrap().clone();
        let mut x = [0.0; 2];
        norm.apply(data.input(1), &mut x);

        normalized.compute(data.input(1));
        raw.compute(&x);
        assert_eq!(normalized.probabilities(), raw.probabilities());
    }

    #[test]
    fn normalization_width_mismatch_is_a_config_error() {
        let mut net = Network::from_widths(&[3, 2], StrategyKind::rprop(), 0).unwrap();
        let data = Dataset::from_rows(&[vec![1.0, 2.0]], &[0]).unwrap();
        assert!(matches!(
            net.set_normalize(&data),
            Err(Error::InvalidConfig(_))
        ));
        assert!(net.normalization().is_none());
    }

    #[test]
    fn settings_update_config() {
        let mut net = Network::from_widths(&[2, 2], StrategyKind::rprop(), 0).unwrap();
        net.set_halt(0.25);
        net.set_accuracy();
        net.set_keep_alive(7);
        net.set_max_iterations(42);
        net.set_sgd(0.5).unwrap();
        assert!(net.set_sgd(0.0).is_err());

        let cfg = net.config();
        assert_eq!(cfg.halt_loss, 0.25);
        assert!(cfg.halt_on_full_accuracy);
        assert_eq!(cfg.keep_alive, 7);
        assert_eq!(cfg.max_iterations, 42);
        assert_eq!(cfg.sgd_fraction, Some(0.5));

        net.turn_off_accuracy();
        assert!(!net.config().halt_on_full_accuracy);
    }

    #[test]
    #[should_panic]
    fn compute_panics_on_input_shape_mismatch() {
        let mut net = Network::from_widths(&[2, 3, 2], StrategyKind::rprop(), 0).unwrap();
        net.compute(&[0.0; 3]);
    }
}
