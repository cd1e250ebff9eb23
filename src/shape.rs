use crate::{Error, Result};

/// Dimensionality of a stratum.
///
/// `input_width` counts the real inputs; parametric strata add the bias column on
/// top of it. `batch_rows` multiplies the cached response/error buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    nodes: usize,
    input_width: usize,
    batch_rows: usize,
}

impl Shape {
    pub fn new(nodes: usize, input_width: usize) -> Result<Self> {
        Self::with_batch_rows(nodes, input_width, 1)
    }

    pub fn with_batch_rows(nodes: usize, input_width: usize, batch_rows: usize) -> Result<Self> {
        if nodes == 0 {
            return Err(Error::InvalidShape("nodes must be > 0".to_owned()));
        }
        if input_width == 0 {
            return Err(Error::InvalidShape("input_width must be > 0".to_owned()));
        }
        if batch_rows == 0 {
            return Err(Error::InvalidShape("batch_rows must be > 0".to_owned()));
        }
        Ok(Self {
            nodes,
            input_width,
            batch_rows,
        })
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    #[inline]
    pub fn batch_rows(&self) -> usize {
        self.batch_rows
    }

    /// Length of a per-node buffer (`nodes * batch_rows`).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes * self.batch_rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
