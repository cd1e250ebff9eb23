use crate::Dataset;

/// Per-feature standardization snapshot, `(x - mean) / std_dev`.
///
/// Features with zero spread are only centered.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    mean: Vec<f64>,
    std_dev: Vec<f64>,
}

impl Normalization {
    pub fn from_dataset(data: &Dataset) -> Self {
        let width = data.input_width();
        let mean = (0..width).map(|f| data.mean(f)).collect();
        let std_dev = (0..width)
            .map(|f| {
                let s = data.std_dev(f);
                if s > 0.0 && s.is_finite() { s } else { 1.0 }
            })
            .collect();
        Self { mean, std_dev }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std_dev(&self) -> &[f64] {
        &self.std_dev
    }

    /// Shape contract: `x.len() == out.len() == self.width()`.
    #[inline]
    pub fn apply(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.width(), "input len does not match normalization width");
        assert_eq!(out.len(), self.width(), "output len does not match normalization width");
        for i in 0..x.len() {
            out[i] = (x[i] - self.mean[i]) / self.std_dev[i];
        }
    }
}
