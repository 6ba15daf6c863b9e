//! Linear algebra helpers shared by the trainer and the predictor.
//!
//! Vectors and matrices live in `ndarray` throughout the crate; the dense
//! factorizations are delegated to `nalgebra` and converted back.

use nalgebra::{Cholesky, DMatrix};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use thiserror::Error;

/// Errors raised by the dense linear algebra helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    /// The input matrix is not square.
    #[error("Matrix is {rows}x{cols}, expected a square matrix.")]
    NotSquare {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Cholesky failed, or the input or its inverse held non-finite values.
    #[error("Cholesky factorization of a {dim}x{dim} matrix failed: not numerically positive definite.")]
    NotPositiveDefinite {
        /// Size of the matrix.
        dim: usize,
    },
}

fn to_dmatrix<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Inverts a symmetric positive-definite matrix through its Cholesky factor.
///
/// A 1×1 input goes through the same factorization as any other size. The
/// returned inverse is symmetrized to remove round-off asymmetry.
pub fn invert_spd<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, LinalgError> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(LinalgError::NotSquare { rows, cols });
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NotPositiveDefinite { dim: rows });
    }

    let chol = Cholesky::new(to_dmatrix(a)).ok_or(LinalgError::NotPositiveDefinite { dim: rows })?;
    let inv = from_dmatrix(&chol.inverse());
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NotPositiveDefinite { dim: rows });
    }

    Ok((&inv + &inv.t()) * 0.5)
}

/// `vᵗ A v`
pub fn quadratic_form<S, T>(v: &ArrayBase<S, Ix1>, a: &ArrayBase<T, Ix2>) -> f64
where
    S: Data<Elem = f64>,
    T: Data<Elem = f64>,
{
    v.dot(&a.dot(v))
}

/// Sum of absolute element-wise differences between two equally long vectors.
pub fn sum_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Largest `|A[i, j] - A[j, i]|`, zero for a symmetric matrix.
pub fn max_asymmetry<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> f64 {
    a.indexed_iter()
        .map(|((i, j), v)| (v - a[(j, i)]).abs())
        .fold(0.0, f64::max)
}

/// Gathers `values[i]` for every `i` in `indices`.
///
/// # Panics
///
/// Panics if any index is out of bounds for `values`.
pub fn select(values: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    indices.iter().map(|&i| values[i]).collect()
}
