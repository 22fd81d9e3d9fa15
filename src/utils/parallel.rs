//! Parallel processing utilities for computationally intensive operations.
//!
//! This module provides the two embarrassingly parallel loops of a subspace
//! build: evaluating a batch of sample points against the full-space model, and
//! running independent bootstrap replicates. With the `parallel` feature they
//! run on Rayon's pool; without it they fall back to sequential iteration.
//! Results always come back in input order, so downstream reductions see the
//! same sequence regardless of scheduling.

use ndarray::{Array1, Array2};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::model::{ActiveSet, FullSpaceModel, Response};

/// Evaluate the model at every column of `points`.
///
/// # Arguments
///
/// * `model` - The model to evaluate
/// * `points` - Sample points, one per column (`num_variables x num_points`)
/// * `request` - Response data to request at every point
///
/// # Returns
///
/// * One response per column, in column order, or the first evaluation error
pub fn evaluate_batch<M: FullSpaceModel + ?Sized>(
    model: &M,
    points: &Array2<f64>,
    request: ActiveSet,
) -> Result<Vec<Response>> {
    let columns: Vec<Array1<f64>> = points.columns().into_iter().map(|c| c.to_owned()).collect();

    #[cfg(feature = "parallel")]
    let responses = columns
        .par_iter()
        .map(|x| model.evaluate(x, request))
        .collect::<Result<Vec<_>>>();

    #[cfg(not(feature = "parallel"))]
    let responses = columns
        .iter()
        .map(|x| model.evaluate(x, request))
        .collect::<Result<Vec<_>>>();

    responses
}

/// Apply `f` to every replicate input, returning outputs in input order.
pub fn map_replicates<I, T, F>(inputs: Vec<I>, f: F) -> Result<Vec<T>>
where
    I: Send,
    T: Send,
    F: Fn(I) -> Result<T> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let outputs = inputs.into_par_iter().map(f).collect::<Result<Vec<_>>>();

    #[cfg(not(feature = "parallel"))]
    let outputs = inputs.into_iter().map(f).collect::<Result<Vec<_>>>();

    outputs
}
