//! Contiguous dataset storage.
//!
//! The training loop reads rows as slices to avoid per-step allocations. `Dataset`
//! keeps the feature matrix row-major next to one class label per row, and
//! answers the per-feature statistics used for input normalization.

use crate::{Error, Result};

/// A labelled classification dataset.
///
/// Stored as a contiguous buffer with row-major layout:
/// - `features.len() == len * input_width`
/// - `labels.len() == len`
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<f64>,
    labels: Vec<usize>,
    input_width: usize,
}

impl Dataset {
    /// Build a dataset from a flat feature buffer with shape `(len, input_width)`.
    pub fn from_flat(features: Vec<f64>, labels: Vec<usize>, input_width: usize) -> Result<Self> {
        if input_width == 0 {
            return Err(Error::InvalidData("input_width must be > 0".to_owned()));
        }
        if !features.len().is_multiple_of(input_width) {
            return Err(Error::InvalidData(format!(
                "features length {} is not divisible by input_width {}",
                features.len(),
                input_width
            )));
        }
        if features.len() / input_width != labels.len() {
            return Err(Error::InvalidData(format!(
                "features hold {} rows but {} labels were given",
                features.len() / input_width,
                labels.len()
            )));
        }

        Ok(Self {
            features,
            labels,
            input_width,
        })
    }

    /// Build a dataset from per-row feature vectors.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f64>], labels: &[usize]) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "rows/labels length mismatch: {} vs {}",
                rows.len(),
                labels.len()
            )));
        }
        if rows.is_empty() {
            return Err(Error::InvalidData("rows must not be empty".to_owned()));
        }

        let input_width = rows[0].len();
        if input_width == 0 {
            return Err(Error::InvalidData("input_width must be > 0".to_owned()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != input_width {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {input_width}",
                    row.len()
                )));
            }
        }

        let mut features = Vec::with_capacity(rows.len() * input_width);
        for row in rows {
            features.extend_from_slice(row);
        }

        Ok(Self {
            features,
            labels: labels.to_vec(),
            input_width,
        })
    }

    #[inline]
    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    #[inline]
    /// Returns the `idx`-th feature row (shape: `(input_width,)`).
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f64] {
        let start = idx * self.input_width;
        &self.features[start..start + self.input_width]
    }

    #[inline]
    /// Returns the class label of row `idx`.
    ///
    /// Panics if `idx >= len`.
    pub fn label(&self, idx: usize) -> usize {
        self.labels[idx]
    }

    /// Number of distinct classes implied by the labels (`max + 1`).
    pub fn classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    /// Mean of feature `feature` over all rows (0 for an empty dataset).
    pub fn mean(&self, feature: usize) -> f64 {
        assert!(feature < self.input_width, "feature {feature} out of range");
        if self.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.column(feature).sum();
        sum / self.len() as f64
    }

    /// Population standard deviation of feature `feature`.
    pub fn std_dev(&self, feature: usize) -> f64 {
        assert!(feature < self.input_width, "feature {feature} out of range");
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.mean(feature);
        let var: f64 = self
            .column(feature)
            .map(|x| (x - mean) * (x - mean))
            .sum::<f64>()
            / self.len() as f64;
        var.sqrt()
    }

    fn column(&self, feature: usize) -> impl Iterator<Item = f64> + '_ {
        self.features
            .iter()
            .skip(feature)
            .step_by(self.input_width)
            .copied()
    }
}
