//! Dense signal matrices.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::PipelineError;

/// A dense row-major `f64` matrix of shape `[rows, cols]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates an all-zero matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix from equal-length rows.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the rows have differing lengths.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let cols = rows.first().map_or(0, Vec::len);
        let n = rows.len();
        let mut data = Vec::with_capacity(n * cols);

        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(PipelineError::shape_mismatch(format!(
                    "row {index} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }

        Ok(Self {
            rows: n,
            cols,
            data,
        })
    }

    /// Returns `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns row `i` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterates over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; a zero-width matrix has no data anyway
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Sum of every cell.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Returns true if every cell is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Applies `f` to every cell, producing a new matrix.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Multiplies every cell by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }
}

/// Matrices keyed by track name, iterating in track order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSet {
    entries: Vec<(String, Arc<Matrix>)>,
}

impl MatrixSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a matrix, replacing any previous entry for `name`.
    pub fn insert(&mut self, name: impl Into<String>, matrix: Arc<Matrix>) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = matrix;
        } else {
            self.entries.push((name, matrix));
        }
    }

    /// Returns the matrix for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Matrix>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    /// Returns the matrix at track position `index`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Arc<Matrix>> {
        self.entries.get(index).map(|(_, m)| m)
    }

    /// Track names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Iterates `(name, matrix)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Matrix>)> {
        self.entries.iter().map(|(n, m)| (n.as_str(), m))
    }

    /// Number of matrices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Common row count of every matrix, or `None` for an empty set.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if two matrices differ in row count.
    pub fn row_count(&self) -> Result<Option<usize>, PipelineError> {
        let mut iter = self.entries.iter();
        let Some((first_name, first)) = iter.next() else {
            return Ok(None);
        };

        for (name, matrix) in iter {
            if matrix.rows() != first.rows() {
                return Err(PipelineError::shape_mismatch(format!(
                    "track '{name}' has {} rows but track '{first_name}' has {}",
                    matrix.rows(),
                    first.rows()
                )));
            }
        }

        Ok(Some(first.rows()))
    }

    /// Checks `other` has the same track names, in order, with identical shapes.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` describing the first difference.
    pub fn check_same_layout(&self, other: &Self) -> Result<(), PipelineError> {
        if self.len() != other.len() {
            return Err(PipelineError::shape_mismatch(format!(
                "expected {} matrices, got {}",
                self.len(),
                other.len()
            )));
        }

        for ((name, m), (other_name, o)) in self.entries.iter().zip(&other.entries) {
            if name != other_name {
                return Err(PipelineError::shape_mismatch(format!(
                    "expected track '{name}', got '{other_name}'"
                )));
            }
            if m.shape() != o.shape() {
                return Err(PipelineError::shape_mismatch(format!(
                    "track '{name}' has shape {:?}, expected {:?}",
                    o.shape(),
                    m.shape()
                )));
            }
        }

        Ok(())
    }
}
