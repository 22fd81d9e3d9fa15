//! Utility functions and helpers for the subspace-uq library.

pub mod matrix_convert;
pub mod parallel;

// Re-export commonly used utilities
pub use matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

pub use parallel::{evaluate_batch, map_replicates};
