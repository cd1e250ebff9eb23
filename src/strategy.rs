//! Weight-update strategies.
//!
//! Each parametric stratum owns one `Strategy`. The stratum accumulates gradients
//! over a whole pass into a matrix shaped like its weights, then hands both to
//! `Strategy::apply`, which updates the weights in place and zeroes the
//! accumulator.
//!
//! - `StrategyKind` is the configuration (what the builder is given).
//! - `Strategy` is the owned per-weight state (what the stratum keeps).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Matrix, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Resilient backpropagation hyperparameters.
pub struct RpropConfig {
    pub eta_plus: f64,
    pub eta_minus: f64,
    pub step_init: f64,
    pub step_min: f64,
    pub step_max: f64,
}

impl Default for RpropConfig {
    fn default() -> Self {
        Self {
            eta_plus: 1.2,
            eta_minus: 0.5,
            step_init: 0.1,
            step_min: 1e-6,
            step_max: 50.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Adam hyperparameters.
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Strategy choice for a stratum.
pub enum StrategyKind {
    Rprop(RpropConfig),
    Adam(AdamConfig),
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Rprop(RpropConfig::default())
    }
}

impl StrategyKind {
    pub fn rprop() -> Self {
        StrategyKind::Rprop(RpropConfig::default())
    }

    pub fn adam() -> Self {
        StrategyKind::Adam(AdamConfig::default())
    }

    /// Validate strategy hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            StrategyKind::Rprop(cfg) => {
                if !(cfg.eta_plus.is_finite() && cfg.eta_plus > 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop eta_plus must be finite and > 1, got {}",
                        cfg.eta_plus
                    )));
                }
                if !(cfg.eta_minus.is_finite() && cfg.eta_minus > 0.0 && cfg.eta_minus < 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop eta_minus must be finite and in (0,1), got {}",
                        cfg.eta_minus
                    )));
                }
                if !(cfg.step_min.is_finite() && cfg.step_min > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop step_min must be finite and > 0, got {}",
                        cfg.step_min
                    )));
                }
                if !(cfg.step_max.is_finite() && cfg.step_max >= cfg.step_min) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop step_max must be finite and >= step_min, got {}",
                        cfg.step_max
                    )));
                }
                if !(cfg.step_min..=cfg.step_max).contains(&cfg.step_init) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop step_init must lie in [step_min, step_max], got {}",
                        cfg.step_init
                    )));
                }
                Ok(())
            }
            StrategyKind::Adam(cfg) => {
                if !(cfg.learning_rate.is_finite() && cfg.learning_rate > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam learning_rate must be finite and > 0, got {}",
                        cfg.learning_rate
                    )));
                }
                if !(cfg.beta1.is_finite() && (0.0..1.0).contains(&cfg.beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {}",
                        cfg.beta1
                    )));
                }
                if !(cfg.beta2.is_finite() && (0.0..1.0).contains(&cfg.beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {}",
                        cfg.beta2
                    )));
                }
                if !(cfg.eps.is_finite() && cfg.eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {}",
                        cfg.eps
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate strategy state for a `(rows, cols)` weight matrix.
    pub fn build(self, rows: usize, cols: usize) -> Result<Strategy> {
        self.validate()?;

        let len = rows * cols;
        let state = match self {
            StrategyKind::Rprop(cfg) => StrategyState::Rprop {
                cfg,
                prev_grad: vec![0.0; len],
                steps: vec![cfg.step_init; len],
            },
            StrategyKind::Adam(cfg) => StrategyState::Adam {
                cfg,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: vec![0.0; len],
                v: vec![0.0; len],
            },
        };
        Ok(Strategy {
            shape: (rows, cols),
            state,
        })
    }
}

#[derive(Debug, Clone)]
/// Owned strategy state for one weight matrix.
pub struct Strategy {
    shape: (usize, usize),
    state: StrategyState,
}

#[derive(Debug, Clone)]
enum StrategyState {
    Rprop {
        cfg: RpropConfig,
        prev_grad: Vec<f64>,
        steps: Vec<f64>,
    },
    Adam {
        cfg: AdamConfig,
        t: u64,
        beta1_pow: f64,
        beta2_pow: f64,
        m: Vec<f64>,
        v: Vec<f64>,
    },
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match &self.state {
            StrategyState::Rprop { cfg, .. } => StrategyKind::Rprop(*cfg),
            StrategyState::Adam { cfg, .. } => StrategyKind::Adam(*cfg),
        }
    }

    /// Current per-weight RPROP step sizes (`None` for other strategies).
    pub fn step_sizes(&self) -> Option<&[f64]> {
        match &self.state {
            StrategyState::Rprop { steps, .. } => Some(steps),
            StrategyState::Adam { .. } => None,
        }
    }

    /// Number of updates applied so far (Adam only tracks this explicitly).
    pub fn updates(&self) -> Option<u64> {
        match &self.state {
            StrategyState::Adam { t, .. } => Some(*t),
            StrategyState::Rprop { .. } => None,
        }
    }

    /// Apply one update.
    ///
    /// Postcondition: `gradient` is all zeros.
    pub fn apply(&mut self, weights: &mut Matrix, gradient: &mut Matrix) {
        assert_eq!(
            weights.shape(),
            self.shape,
            "weights shape {:?} does not match strategy shape {:?}",
            weights.shape(),
            self.shape
        );
        assert_eq!(
            gradient.shape(),
            self.shape,
            "gradient shape {:?} does not match strategy shape {:?}",
            gradient.shape(),
            self.shape
        );

        let w = weights.as_mut_slice();
        let g = gradient.as_slice();

        match &mut self.state {
            StrategyState::Rprop {
                cfg,
                prev_grad,
                steps,
            } => {
                for i in 0..w.len() {
                    let grad = g[i];
                    let trend = prev_grad[i] * grad;

                    if trend > 0.0 {
                        steps[i] = (steps[i] * cfg.eta_plus).min(cfg.step_max);
                        w[i] -= grad.signum() * steps[i];
                        prev_grad[i] = grad;
                    } else if trend < 0.0 {
                        // Overshot: shrink and sit this step out.
                        steps[i] = (steps[i] * cfg.eta_minus).max(cfg.step_min);
                        prev_grad[i] = 0.0;
                    } else {
                        if grad != 0.0 {
                            w[i] -= grad.signum() * steps[i];
                        }
                        prev_grad[i] = grad;
                    }
                }
            }
            StrategyState::Adam {
                cfg,
                t,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *t += 1;
                *beta1_pow *= cfg.beta1;
                *beta2_pow *= cfg.beta2;

                let one_minus_beta1 = 1.0 - cfg.beta1;
                let one_minus_beta2 = 1.0 - cfg.beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                for i in 0..w.len() {
                    let grad = g[i];
                    m[i] = cfg.beta1 * m[i] + one_minus_beta1 * grad;
                    v[i] = cfg.beta2 * v[i] + one_minus_beta2 * (grad * grad);

                    let m_hat = m[i] / corr1;
                    let v_hat = v[i] / corr2;
                    w[i] -= cfg.learning_rate * m_hat / (v_hat.sqrt() + cfg.eps);
                }
            }
        }

        gradient.zero();
    }
}
