//! Matrix conversion utilities for the subspace-uq library.
//!
//! The public API stores every matrix as an ndarray `Array2`, while the dense
//! factorizations run on nalgebra `DMatrix`. These helpers move
//! data between the two layouts. Unlike a plain element copy they accept empty
//! inputs, since an empty derivative matrix is a legitimate (if fatal) state.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

/// Convert an ndarray matrix view to a nalgebra DMatrix.
///
/// ndarray is row-major by default and nalgebra column-major; the copy goes
/// element by element so either memory order of `arr` works.
pub fn ndarray_to_nalgebra(arr: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}
