//! # Dense Linear Algebra Kernel
//!
//! Thin wrappers around nalgebra's dense factorizations (SVD, symmetric eigen,
//! QR, Cholesky, LU determinant) working on ndarray storage. The wrappers pin down the
//! contracts the subspace algorithms depend on:
//!
//! - singular values and eigenvalues come back in descending order, with their
//!   vectors permuted to match;
//! - the left singular basis is always the full `n x n` orthogonal matrix, even
//!   when the input has fewer columns than rows, so that it can be partitioned
//!   into active and inactive blocks;
//! - inputs are taken by reference and never modified.

use nalgebra::{DMatrix, SymmetricEigen, SVD};
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{Result, SubspaceError};
use crate::utils::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Singular value decomposition `A = U diag(s) V^T`.
#[derive(Debug, Clone)]
pub struct SvdResult {
    /// Full left singular basis, `nrows x nrows`, columns ordered like `singular_values`
    pub left_singular_vectors: Array2<f64>,

    /// Singular values in descending order, `min(nrows, ncols)` of them
    pub singular_values: Array1<f64>,

    /// Leading right singular vectors as rows, `min(nrows, ncols) x ncols`
    pub right_singular_vectors_t: Array2<f64>,
}

/// Compute the SVD of `matrix`.
///
/// Matrices with fewer columns than rows are padded with zero columns before
/// factoring; the padding only contributes zero singular values, which are
/// dropped, but it makes nalgebra return a complete left basis.
pub fn svd(matrix: ArrayView2<'_, f64>) -> Result<SvdResult> {
    let (nrows, ncols) = matrix.dim();
    let k = nrows.min(ncols);

    if nrows == 0 || ncols == 0 {
        return Ok(SvdResult {
            left_singular_vectors: Array2::eye(nrows),
            singular_values: Array1::zeros(0),
            right_singular_vectors_t: Array2::zeros((0, ncols)),
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(SubspaceError::LinearAlgebra(
            "SVD input contains non-finite entries".to_string(),
        ));
    }

    let padded_cols = ncols.max(nrows);
    let mut padded = DMatrix::<f64>::zeros(nrows, padded_cols);
    for ((i, j), v) in matrix.indexed_iter() {
        padded[(i, j)] = *v;
    }

    let decomposition = SVD::new(padded, true, true);
    let u = decomposition
        .u
        .ok_or_else(|| SubspaceError::LinearAlgebra("SVD did not produce U".to_string()))?;
    let v_t = decomposition
        .v_t
        .ok_or_else(|| SubspaceError::LinearAlgebra("SVD did not produce V^T".to_string()))?;
    let values = decomposition.singular_values;

    let order = descending_order(values.as_slice());

    let left = Array2::from_shape_fn((nrows, nrows), |(i, j)| u[(i, order[j])]);
    let singular_values = Array1::from_iter(order.iter().take(k).map(|&idx| values[idx]));
    let right_t = Array2::from_shape_fn((k, ncols), |(i, j)| v_t[(order[i], j)]);

    Ok(SvdResult {
        left_singular_vectors: left,
        singular_values,
        right_singular_vectors_t: right_t,
    })
}

/// Maximum absolute row sum.
pub fn infinity_norm(matrix: ArrayView2<'_, f64>) -> f64 {
    matrix
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Threshold below which a singular value of `matrix` is numerically zero:
/// `||matrix||_inf * machine_epsilon`.
pub fn numerical_rank_threshold(matrix: ArrayView2<'_, f64>) -> f64 {
    infinity_norm(matrix) * f64::EPSILON
}

/// Frobenius norm.
pub fn frobenius_norm(matrix: ArrayView2<'_, f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Eigen-decomposition of a symmetric matrix, eigenvalues descending.
pub fn symmetric_eigen(matrix: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let (n, m) = matrix.dim();
    if n != m {
        return Err(SubspaceError::DimensionMismatch(format!(
            "Symmetric eigen-decomposition needs a square matrix, got {}x{}",
            n, m
        )));
    }
    if n == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }

    let eigen = SymmetricEigen::new(ndarray_to_nalgebra(matrix));
    let order = descending_order(eigen.eigenvalues.as_slice());
    let values = Array1::from_iter(order.iter().map(|&idx| eigen.eigenvalues[idx]));
    let vectors = Array2::from_shape_fn((n, n), |(i, j)| eigen.eigenvectors[(i, order[j])]);
    Ok((values, vectors))
}

/// Determinant of a square matrix.
pub fn determinant(matrix: ArrayView2<'_, f64>) -> Result<f64> {
    let (n, m) = matrix.dim();
    if n != m {
        return Err(SubspaceError::DimensionMismatch(format!(
            "Determinant needs a square matrix, got {}x{}",
            n, m
        )));
    }
    if n == 0 {
        return Ok(1.0);
    }
    Ok(ndarray_to_nalgebra(matrix).determinant())
}

/// Lower Cholesky factor `L` with `A = L L^T`.
///
/// Only the lower triangle of `matrix` is read; a matrix that is not positive
/// definite is a linear algebra error.
pub fn cholesky_lower(matrix: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let (n, m) = matrix.dim();
    if n != m {
        return Err(SubspaceError::DimensionMismatch(format!(
            "Cholesky needs a square matrix, got {}x{}",
            n, m
        )));
    }
    let factor = ndarray_to_nalgebra(matrix).cholesky().ok_or_else(|| {
        SubspaceError::LinearAlgebra("matrix is not positive definite".to_string())
    })?;
    Ok(nalgebra_to_ndarray(&factor.l()))
}

/// Orthonormal basis for the column space of a square, full-rank matrix via QR.
///
/// Column `j` of the result spans the same flag as the first `j + 1` columns
/// of the input; signs are fixed so the diagonal of `R` is non-negative.
pub fn qr_orthonormal_columns(matrix: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let (n, m) = matrix.dim();
    if n < m {
        return Err(SubspaceError::DimensionMismatch(format!(
            "QR orthonormalization needs at least as many rows as columns, got {}x{}",
            n, m
        )));
    }

    let qr = ndarray_to_nalgebra(matrix).qr();
    let mut q = qr.q();
    let r = qr.r();
    for j in 0..m {
        if r[(j, j)].abs() <= f64::EPSILON * (n as f64) {
            return Err(SubspaceError::LinearAlgebra(format!(
                "QR orthonormalization: column {} is linearly dependent",
                j
            )));
        }
        if r[(j, j)] < 0.0 {
            for i in 0..n {
                q[(i, j)] = -q[(i, j)];
            }
        }
    }
    Ok(nalgebra_to_ndarray(&q))
}

/// Orthonormalize the rows of `rows` in order with modified Gram-Schmidt,
/// skipping rows whose remainder norm falls below `tol` times their original
/// norm. Stops once `max_rows` rows are accepted.
pub fn orthonormalize_rows(rows: ArrayView2<'_, f64>, tol: f64, max_rows: usize) -> Array2<f64> {
    let ncols = rows.ncols();
    let mut accepted: Vec<Array1<f64>> = Vec::new();

    for row in rows.rows() {
        if accepted.len() >= max_rows {
            break;
        }
        let norm0 = row.dot(&row).sqrt();
        if norm0 == 0.0 {
            continue;
        }
        let mut v = row.to_owned();
        // two passes keep the basis orthogonal to working precision
        for _ in 0..2 {
            for q in &accepted {
                let proj = q.dot(&v);
                v.scaled_add(-proj, q);
            }
        }
        let norm = v.dot(&v).sqrt();
        if norm > tol * norm0 {
            v /= norm;
            accepted.push(v);
        }
    }

    let mut out = Array2::zeros((accepted.len(), ncols));
    for (i, q) in accepted.iter().enumerate() {
        out.row_mut(i).assign(q);
    }
    out
}

/// Minimum-norm least-squares solution of `a * x = b` via SVD.
pub fn least_squares(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    if a.nrows() != b.nrows() {
        return Err(SubspaceError::DimensionMismatch(format!(
            "Least squares: {} equations but {} right-hand-side rows",
            a.nrows(),
            b.nrows()
        )));
    }
    if a.ncols() == 0 {
        return Ok(Array2::zeros((0, b.ncols())));
    }

    let a_na = ndarray_to_nalgebra(a);
    let b_na = ndarray_to_nalgebra(b);
    let eps = a_na.iter().fold(0.0f64, |m, v| m.max(v.abs()))
        * f64::EPSILON
        * (a.nrows().max(a.ncols()) as f64);
    let solution = SVD::new(a_na, true, true)
        .solve(&b_na, eps)
        .map_err(|e| SubspaceError::LinearAlgebra(format!("Least squares solve failed: {}", e)))?;
    Ok(nalgebra_to_ndarray(&solution))
}

fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}
