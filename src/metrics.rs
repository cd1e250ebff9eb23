//! Per-pass training statistics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop). They are
//! accumulated row by row during a pass without allocating.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Running loss/accuracy over one pass.
pub struct EpochStats {
    loss_sum: f64,
    correct: usize,
    seen: usize,
    clamped: usize,
}

impl EpochStats {
    /// `clamped` marks a row whose non-finite loss was replaced by the sentinel.
    #[inline]
    pub fn record(&mut self, loss: f64, correct: bool, clamped: bool) {
        self.loss_sum += loss;
        self.seen += 1;
        if correct {
            self.correct += 1;
        }
        if clamped {
            self.clamped += 1;
        }
    }

    #[inline]
    pub fn seen(&self) -> usize {
        self.seen
    }

    #[inline]
    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Rows whose loss had to be replaced by the sentinel.
    #[inline]
    pub fn clamped(&self) -> usize {
        self.clamped
    }

    /// Mean loss over the pass (NaN before any row is recorded).
    pub fn mean_loss(&self) -> f64 {
        if self.seen == 0 {
            return f64::NAN;
        }
        self.loss_sum / self.seen as f64
    }

    /// Fraction of rows classified correctly (0 before any row is recorded).
    pub fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            return 0.0;
        }
        self.correct as f64 / self.seen as f64
    }

    #[inline]
    pub fn is_fully_accurate(&self) -> bool {
        self.seen > 0 && self.correct == self.seen
    }
}
