//! Owned row-major matrix storage.
//!
//! Parametric strata keep their weights as `(nodes, inputs + 1)` matrices where
//! column 0 holds the bias. The helpers below all treat the input as implicitly
//! augmented with a leading constant `1`, so callers never build the augmented
//! vector themselves.

use crate::matmul::gemm_f64;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from a row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidShape(format!(
                "buffer length {} does not match rows * cols ({rows} * {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// `out = W [1; x]`.
    ///
    /// Shape contract:
    /// - `x.len() == self.cols() - 1`
    /// - `out.len() == self.rows()`
    pub fn affine_into(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(
            x.len() + 1,
            self.cols,
            "input len {} does not match matrix cols - 1 ({})",
            x.len(),
            self.cols - 1
        );
        assert_eq!(
            out.len(),
            self.rows,
            "output len {} does not match matrix rows {}",
            out.len(),
            self.rows
        );

        for (o, row) in out.iter_mut().zip(self.data.chunks_exact(self.cols)) {
            *o = row[0];
        }
        gemm_f64(
            self.rows,
            1,
            self.cols - 1,
            1.0,
            &self.data[1..],
            self.cols,
            1,
            x,
            1,
            1,
            1.0,
            out,
            1,
            1,
        );
    }

    /// `out = transpose(W without bias column) · delta`.
    ///
    /// Shape contract:
    /// - `delta.len() == self.rows()`
    /// - `out.len() == self.cols() - 1`
    pub fn transpose_mult_into(&self, delta: &[f64], out: &mut [f64]) {
        assert_eq!(
            delta.len(),
            self.rows,
            "delta len {} does not match matrix rows {}",
            delta.len(),
            self.rows
        );
        assert_eq!(
            out.len() + 1,
            self.cols,
            "output len {} does not match matrix cols - 1 ({})",
            out.len(),
            self.cols - 1
        );

        gemm_f64(
            self.cols - 1,
            1,
            self.rows,
            1.0,
            &self.data[1..],
            1,
            self.cols,
            delta,
            1,
            1,
            0.0,
            out,
            1,
            1,
        );
    }

    /// `self += delta · transpose([1; x])`.
    ///
    /// Shape contract:
    /// - `delta.len() == self.rows()`
    /// - `x.len() == self.cols() - 1`
    pub fn add_outer(&mut self, delta: &[f64], x: &[f64]) {
        assert_eq!(
            delta.len(),
            self.rows,
            "delta len {} does not match matrix rows {}",
            delta.len(),
            self.rows
        );
        assert_eq!(
            x.len() + 1,
            self.cols,
            "input len {} does not match matrix cols - 1 ({})",
            x.len(),
            self.cols - 1
        );

        let cols = self.cols;
        for (row, &d) in self.data.chunks_exact_mut(cols).zip(delta) {
            row[0] += d;
        }
        gemm_f64(
            self.rows,
            cols - 1,
            1,
            1.0,
            delta,
            1,
            1,
            x,
            1,
            1,
            1.0,
            &mut self.data[1..],
            cols,
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        // bias | weights
        Matrix::from_vec(2, 3, vec![0.5, 1.0, 2.0, -1.0, 3.0, -4.0]).unwrap()
    }

    #[test]
    fn from_vec_validates_length() {
        assert!(Matrix::from_vec(2, 2, vec![0.0; 3]).is_err());
        assert!(Matrix::from_vec(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn affine_includes_bias_column() {
        let w = sample();
        let mut out = [0.0; 2];
        w.affine_into(&[1.0, 1.0], &mut out);
        assert_eq!(out, [3.5, -2.0]);
    }

    #[test]
    fn transpose_mult_skips_bias_column() {
        let w = sample();
        let mut out = [0.0; 2];
        w.transpose_mult_into(&[1.0, 2.0], &mut out);
        assert_eq!(out, [7.0, -6.0]);
    }

    #[test]
    fn add_outer_accumulates_with_bias() {
        let mut g = Matrix::zeros(2, 3);
        g.add_outer(&[1.0, -2.0], &[3.0, 4.0]);
        g.add_outer(&[1.0, 0.0], &[1.0, 1.0]);
        assert_eq!(g.as_slice(), &[2.0, 4.0, 5.0, -2.0, -6.0, -8.0]);

        g.zero();
        assert!(g.as_slice().iter().all(|&v| v == 0.0));
    }
}
