//! The epoch loop.
//!
//! One epoch is one pass over the working subset (the whole dataset, or a fresh
//! random fraction of it when SGD sampling is on): every row is pushed forward,
//! scored at the softmax terminal and backpropagated into the gradient
//! accumulators, then every stratum applies its strategy once.

use log::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::metrics::EpochStats;
use crate::sampling::validate_fraction;
use crate::{Dataset, Error, Network, Result, Sampler};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Halting and sampling settings for `Network::train`.
pub struct TrainConfig {
    /// Stop once the mean loss of a pass is at or below this value.
    pub halt_loss: f64,
    /// Also stop once a pass classifies every row correctly.
    pub halt_on_full_accuracy: bool,
    /// Epoch budget used by `Network::train`.
    pub max_iterations: usize,
    /// Log a status line every `keep_alive` steps (0 disables it).
    pub keep_alive: usize,
    /// Fraction of rows drawn (without replacement) per epoch; `None` trains full-batch.
    pub sgd_fraction: Option<f64>,
    /// Consecutive epochs with sentinel-clamped losses tolerated before giving up.
    pub divergence_patience: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            halt_loss: 1e-5,
            halt_on_full_accuracy: false,
            max_iterations: 5000,
            keep_alive: 100,
            sgd_fraction: None,
            divergence_patience: 25,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.halt_loss.is_finite() && self.halt_loss >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "halt_loss must be finite and >= 0, got {}",
                self.halt_loss
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be > 0".to_owned()));
        }
        if let Some(fraction) = self.sgd_fraction {
            validate_fraction(fraction)?;
        }
        if self.divergence_patience == 0 {
            return Err(Error::InvalidConfig(
                "divergence_patience must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why training stopped.
pub enum Outcome {
    /// The loss threshold (or full accuracy, when requested) was reached.
    Converged,
    /// The epoch budget ran out first.
    Exhausted,
    /// The caller asked to stop between epochs.
    Interrupted,
    /// Losses stayed non-finite for `divergence_patience` epochs in a row.
    Diverged,
}

impl Outcome {
    /// Only a converged run counts as an accepted solution.
    #[inline]
    pub fn is_accepted(self) -> bool {
        self == Outcome::Converged
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Summary of one epoch, handed to the `train_with` observer.
pub struct EpochReport {
    /// Network step count after this epoch.
    pub step: usize,
    /// Rows in this epoch's working subset.
    pub rows: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// Rows whose loss was replaced by the sentinel.
    pub clamped: usize,
}

impl Network {
    /// Train for at most `config().max_iterations` epochs.
    pub fn train(&mut self, data: &Dataset) -> Result<Outcome> {
        let max_iterations = self.config.max_iterations;
        self.train_for(data, max_iterations)
    }

    /// Train for at most `max_iterations` epochs.
    pub fn train_for(&mut self, data: &Dataset, max_iterations: usize) -> Result<Outcome> {
        self.train_with(data, max_iterations, |_| false)
    }

    /// Train for at most `max_iterations` epochs, consulting `interrupt` after each one.
    ///
    /// `interrupt` returning `true` stops training with `Outcome::Interrupted`; the
    /// epoch's update has already been applied and `loss()`/`accuracy()`/`steps()`
    /// reflect it.
    ///
    /// When a halt condition holds, the pending update of that epoch is discarded,
    /// so the reported loss and accuracy describe the weights left in place.
    pub fn train_with<F>(
        &mut self,
        data: &Dataset,
        max_iterations: usize,
        mut interrupt: F,
    ) -> Result<Outcome>
    where
        F: FnMut(&EpochReport) -> bool,
    {
        self.validate_training_data(data)?;
        self.config.validate()?;
        if max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be > 0".to_owned()));
        }

        let cfg = self.config;
        let mut sampler = cfg
            .sgd_fraction
            .map(|fraction| Sampler::new(data.len(), fraction))
            .transpose()?;

        let mut epochs = 0;
        let mut clamped_streak = 0;

        loop {
            let stats = match sampler.as_mut() {
                Some(sampler) => {
                    let subset = sampler.draw(&mut self.rng);
                    self.pass(data, subset.iter().copied())
                }
                None => self.pass(data, 0..data.len()),
            };

            epochs += 1;
            self.steps += 1;
            self.loss = stats.mean_loss();
            self.accuracy = stats.accuracy();

            let report = EpochReport {
                step: self.steps,
                rows: stats.seen(),
                loss: self.loss,
                accuracy: self.accuracy,
                clamped: stats.clamped(),
            };

            if cfg.keep_alive > 0 && self.steps % cfg.keep_alive == 0 {
                info!(
                    "step {} loss {:.6} accuracy {:.4}",
                    self.steps, self.loss, self.accuracy
                );
            }

            if self.loss <= cfg.halt_loss
                || (cfg.halt_on_full_accuracy && stats.is_fully_accurate())
            {
                self.discard_gradients();
                info!(
                    "converged after {} steps: loss {:.6} accuracy {:.4}",
                    self.steps, self.loss, self.accuracy
                );
                return Ok(Outcome::Converged);
            }

            if stats.clamped() > 0 {
                clamped_streak += 1;
                warn!(
                    "step {}: {} of {} losses were non-finite and clamped",
                    self.steps,
                    stats.clamped(),
                    stats.seen()
                );
            } else {
                clamped_streak = 0;
            }
            if clamped_streak >= cfg.divergence_patience {
                self.discard_gradients();
                warn!(
                    "diverged: {clamped_streak} consecutive epochs with clamped losses at step {}",
                    self.steps
                );
                return Ok(Outcome::Diverged);
            }

            self.update_weights();

            if interrupt(&report) {
                info!("interrupted at step {}", self.steps);
                return Ok(Outcome::Interrupted);
            }
            if epochs >= max_iterations {
                return Ok(Outcome::Exhausted);
            }
        }
    }

    /// Mean loss and accuracy of the current weights over `data`, without training.
    pub fn evaluate(&mut self, data: &Dataset) -> Result<(f64, f64)> {
        self.validate_training_data(data)?;

        let mut stats = EpochStats::default();
        for idx in 0..data.len() {
            let guess = self.forward_row(data.input(idx));
            let label = data.label(idx);
            let (loss, clamped) = self.terminal_loss(label);
            stats.record(loss, guess == label, clamped);
        }
        Ok((stats.mean_loss(), stats.accuracy()))
    }

    fn pass<I>(&mut self, data: &Dataset, rows: I) -> EpochStats
    where
        I: Iterator<Item = usize>,
    {
        let mut stats = EpochStats::default();
        for idx in rows {
            let guess = self.forward_row(data.input(idx));
            let label = data.label(idx);
            let (loss, clamped) = self.backward_row(label);
            stats.record(loss, guess == label, clamped);
        }
        stats
    }

    fn validate_training_data(&self, data: &Dataset) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }
        if data.input_width() != self.input_width() {
            return Err(Error::InvalidData(format!(
                "dataset input_width {} does not match network input_width {}",
                data.input_width(),
                self.input_width()
            )));
        }
        if data.classes() > self.output_width() {
            return Err(Error::InvalidData(format!(
                "dataset has label {} but the network only has {} classes",
                data.classes() - 1,
                self.output_width()
            )));
        }
        Ok(())
    }
}
