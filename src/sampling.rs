//! Per-epoch row sampling without replacement.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Draws a fresh subset of `fraction * rows` distinct row indices per epoch.
///
/// Keeps a permutation of `0..rows` and partially reshuffles it on every draw, so
/// sampling allocates nothing after construction.
#[derive(Debug, Clone)]
pub struct Sampler {
    rows: usize,
    amount: usize,
    permutation: Vec<usize>,
}

impl Sampler {
    /// `fraction` must lie in `(0, 1]`; the subset size is rounded and never below 1.
    pub fn new(rows: usize, fraction: f64) -> Result<Self> {
        validate_fraction(fraction)?;
        if rows == 0 {
            return Err(Error::InvalidData("cannot sample from 0 rows".to_owned()));
        }
        let amount = ((fraction * rows as f64).round() as usize).clamp(1, rows);
        Ok(Self {
            rows,
            amount,
            permutation: (0..rows).collect(),
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Subset size per draw.
    #[inline]
    pub fn amount(&self) -> usize {
        self.amount
    }

    /// Draw the next subset. No index repeats within one draw.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &[usize] {
        let (chosen, _rest) = self.permutation.partial_shuffle(rng, self.amount);
        chosen
    }
}

pub(crate) fn validate_fraction(fraction: f64) -> Result<()> {
    if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
        return Err(Error::InvalidConfig(format!(
            "sgd fraction must be finite and in (0,1], got {fraction}"
        )));
    }
    Ok(())
}
