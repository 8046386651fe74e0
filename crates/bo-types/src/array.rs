//! Dense row-major buffers used at the index boundary.

use serde::{Deserialize, Serialize};

use crate::errors::{BoResult, IndexError};
use crate::validation_error;

/// An n-dimensional, row-major buffer of `f64`.
///
/// Queries arrive as `Array` so that a caller handing over a batch
/// (`[n, dims]`) instead of a single vector is caught before search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Array {
    /// A 1-D array.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn from_shape(shape: Vec<usize>, data: Vec<f64>) -> BoResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(validation_error!(
                "shape {:?} holds {} elements, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl From<Vec<f64>> for Array {
    fn from(data: Vec<f64>) -> Self {
        Self::vector(data)
    }
}

impl From<&[f64]> for Array {
    fn from(data: &[f64]) -> Self {
        Self::vector(data.to_vec())
    }
}

/// A `[rows, cols]` matrix. Row order is meaningful (it is the corpus order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// An empty matrix with a fixed width, used as a concatenation seed.
    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    /// Build from rows, rejecting rows whose width differs from the first.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, IndexError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);

        for (row, values) in rows.iter().enumerate() {
            if values.len() != cols {
                return Err(IndexError::Ragged {
                    row,
                    expected: cols,
                    actual: values.len(),
                });
            }
            data.extend_from_slice(values);
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn from_flat(rows: usize, cols: usize, data: Vec<f64>) -> BoResult<Self> {
        if rows * cols != data.len() {
            return Err(validation_error!(
                "matrix [{}, {}] needs {} values, got {}",
                rows,
                cols,
                rows * cols,
                data.len()
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Stack matrices vertically, preserving order.
    pub fn concat(parts: Vec<Matrix>) -> Result<Self, IndexError> {
        let cols = parts.first().map(|m| m.cols).unwrap_or(0);
        let mut out = Self::empty(cols);

        for part in parts {
            if part.cols != cols {
                return Err(IndexError::Ragged {
                    row: out.rows,
                    expected: cols,
                    actual: part.cols,
                });
            }
            out.rows += part.rows;
            out.data.extend(part.data);
        }

        Ok(out)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on a zero chunk size
        let width = self.cols.max(1);
        self.data.chunks_exact(width).take(self.rows)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Select rows by index, in the given order.
    pub fn gather(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            data.extend_from_slice(self.row(idx));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Per-column `(min, max)`.
    pub fn column_min_max(&self) -> Vec<(f64, f64)> {
        let mut extrema = vec![(f64::INFINITY, f64::NEG_INFINITY); self.cols];
        for row in self.rows_iter() {
            for (slot, &value) in extrema.iter_mut().zip(row) {
                slot.0 = slot.0.min(value);
                slot.1 = slot.1.max(value);
            }
        }
        extrema
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows_iter().map(<[f64]>::to_vec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_shape_checks() {
        let a = Array::vector(vec![1.0, 2.0]);
        assert_eq!(a.ndim(), 1);
        assert_eq!(a.shape(), &[2]);

        let b = Array::from_shape(vec![2, 2], vec![0.0; 4]).unwrap();
        assert_eq!(b.ndim(), 2);

        assert!(Array::from_shape(vec![2, 3], vec![0.0; 4]).is_err());
    }

    #[test]
    fn matrix_rejects_ragged_rows() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            IndexError::Ragged {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn matrix_gather_and_extrema() {
        let m = Matrix::from_rows(vec![vec![0.0, 5.0], vec![2.0, -1.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(1), &[2.0, -1.0]);

        let picked = m.gather(&[2, 0]);
        assert_eq!(picked.to_rows(), vec![vec![1.0, 1.0], vec![0.0, 5.0]]);

        assert_eq!(m.column_min_max(), vec![(0.0, 2.0), (-1.0, 5.0)]);
    }

    #[test]
    fn matrix_concat_preserves_order() {
        let a = Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![3.0]]).unwrap();
        let c = Matrix::concat(vec![a, b]).unwrap();
        assert_eq!(c.to_rows(), vec![vec![1.0], vec![2.0], vec![3.0]]);

        let wide = Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        let narrow = Matrix::from_rows(vec![vec![1.0]]).unwrap();
        assert!(Matrix::concat(vec![wide, narrow]).is_err());
    }

    #[test]
    fn matrix_from_flat_checks_length() {
        assert!(Matrix::from_flat(2, 2, vec![0.0; 3]).is_err());
        let m = Matrix::from_flat(2, 1, vec![4.0, 5.0]).unwrap();
        assert_eq!(m.row(1), &[5.0]);
    }
}
