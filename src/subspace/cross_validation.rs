//! Cross-validated rank selection.
//!
//! For each candidate rank `r` the samples are projected onto the leading `r`
//! left singular vectors and a quadratic moving least squares surrogate is
//! trained on all but one fold, then scored on the held-out fold. The error of
//! a rank is the fold average of the worst per-response RMS error, each
//! normalized by the sample standard deviation of that response.

use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

use crate::error::{Result, SubspaceError};
use crate::surrogate::{quadratic_terms, MovingLeastSquares, SurrogateFitter};

use super::bootstrap::BootstrapRngState;
use super::config::{CvMetric, SubspaceConfig};

/// Sample points and their response values.
#[derive(Debug, Clone, Copy)]
pub struct CrossValidationData<'a> {
    variables: ArrayView2<'a, f64>,
    values: ArrayView2<'a, f64>,
}

impl<'a> CrossValidationData<'a> {
    /// `variables` is `num_vars x n`, `values` is `num_functions x n`.
    pub fn new(variables: ArrayView2<'a, f64>, values: ArrayView2<'a, f64>) -> Result<Self> {
        if variables.ncols() != values.ncols() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "{} sample points but {} response columns",
                variables.ncols(),
                values.ncols()
            )));
        }
        Ok(Self { variables, values })
    }

    pub fn num_samples(&self) -> usize {
        self.variables.ncols()
    }
}

/// Cross-validation outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationResult {
    /// Selected rank, 0 when the criterion abstained
    pub rank: usize,

    /// Error of rank `i + 1` at index `i`
    pub errors: Vec<f64>,
}

/// Split a shuffled permutation of `0..n` into `k` contiguous folds; the first
/// `n % k` folds hold one extra sample.
pub fn partition_folds(n: usize, k: usize, rng: &mut BootstrapRngState) -> Vec<Vec<usize>> {
    let mut permutation: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut permutation);

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        folds.push(permutation[start..start + size].to_vec());
        start += size;
    }
    folds
}

/// Largest rank whose quadratic fit is determined by `training_points`,
/// capped by `cap`.
pub fn max_cv_rank(training_points: usize, cap: usize) -> usize {
    (1..=cap)
        .take_while(|&r| quadratic_terms(r) <= training_points)
        .last()
        .unwrap_or(0)
}

fn argmin_rank(errors: &[f64]) -> usize {
    let mut best = 0;
    for (i, &e) in errors.iter().enumerate() {
        if e < errors[best] {
            best = i;
        }
    }
    best + 1
}

/// Pick a rank from an error curve under `metric`.
pub fn select_rank(errors: &[f64], metric: CvMetric, relative_tol: f64, decrease_tol: f64) -> usize {
    if errors.is_empty() {
        return 0;
    }
    match metric {
        CvMetric::Minimum => argmin_rank(errors),
        CvMetric::Relative => errors
            .iter()
            .position(|&e| e < relative_tol)
            .map(|i| i + 1)
            .unwrap_or_else(|| argmin_rank(errors)),
        CvMetric::Decrease => errors
            .windows(2)
            .position(|w| w[0] - w[1] < decrease_tol)
            .map(|i| i + 1)
            .unwrap_or_else(|| argmin_rank(errors)),
    }
}

fn policy_satisfied(errors: &[f64], config: &SubspaceConfig) -> bool {
    match config.cv_metric {
        CvMetric::Minimum => false,
        CvMetric::Relative => errors
            .last()
            .map_or(false, |&e| e < config.cv_relative_tolerance),
        CvMetric::Decrease => match errors {
            [.., prev, last] => prev - last < config.cv_decrease_tolerance,
            _ => false,
        },
    }
}

fn response_scales(values: ArrayView2<'_, f64>) -> Array1<f64> {
    values.map_axis(Axis(1), |row| {
        let sd = row.std(0.0);
        if sd > 0.0 {
            sd
        } else {
            1.0
        }
    })
}

fn fold_error(
    projected: &Array2<f64>,
    values: ArrayView2<'_, f64>,
    scales: &Array1<f64>,
    training: &[usize],
    testing: &[usize],
) -> Result<f64> {
    let rank = projected.nrows();
    let num_functions = values.nrows();

    let mut surrogate = MovingLeastSquares::new(rank, num_functions);
    surrogate.append_training_data(
        projected.select(Axis(1), training).view(),
        values.select(Axis(1), training).view(),
    )?;
    surrogate.build()?;

    let mut squared = Array1::<f64>::zeros(num_functions);
    for &j in testing {
        let predicted = surrogate.evaluate(projected.column(j))?;
        let residual = &predicted - &values.column(j);
        squared += &residual.mapv(|v| v * v);
    }
    let count = testing.len().max(1) as f64;
    Ok(squared
        .iter()
        .zip(scales.iter())
        .map(|(s, scale)| (s / count).sqrt() / scale)
        .fold(0.0, f64::max))
}

/// Run the cross-validation criterion with the left singular basis `left`.
///
/// Abstains with rank 0 when no rank has enough training points for a
/// quadratic fit.
pub fn cross_validation_criterion(
    left: &Array2<f64>,
    data: &CrossValidationData<'_>,
    config: &SubspaceConfig,
    rng: &mut BootstrapRngState,
) -> Result<CrossValidationResult> {
    let n = data.num_samples();
    let num_vars = left.nrows();
    if data.variables.nrows() != num_vars {
        return Err(SubspaceError::DimensionMismatch(format!(
            "cross-validation samples have {} variables, basis has {}",
            data.variables.nrows(),
            num_vars
        )));
    }

    let folds = config.cv_folds.min(n);
    let abstain = CrossValidationResult {
        rank: 0,
        errors: Vec::new(),
    };
    if folds < 2 {
        warn!("Cross-validation needs at least 2 samples, got {}; skipping", n);
        return Ok(abstain);
    }

    let smallest_training = n - (n + folds - 1) / folds;
    let cap = config.cv_max_rank.unwrap_or(num_vars).min(num_vars);
    let max_rank = max_cv_rank(smallest_training, cap);
    if max_rank == 0 {
        warn!(
            "Cross-validation training folds of {} points are too small for a quadratic fit; skipping",
            smallest_training
        );
        return Ok(abstain);
    }

    let partition = partition_folds(n, folds, rng);
    let splits: Vec<(Vec<usize>, Vec<usize>)> = partition
        .iter()
        .enumerate()
        .map(|(i, testing)| {
            let training = partition
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != i)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();
            (training, testing.clone())
        })
        .collect();

    let scales = response_scales(data.values);
    let mut errors = Vec::with_capacity(max_rank);
    for rank in 1..=max_rank {
        let projected = left.slice(s![.., ..rank]).t().dot(&data.variables);
        let mut total = 0.0;
        for (training, testing) in &splits {
            total += fold_error(&projected, data.values, &scales, training, testing)?;
        }
        let error = total / splits.len() as f64;
        debug!("Cross-validation error at rank {}: {:e}", rank, error);
        errors.push(error);

        if config.cv_incremental && policy_satisfied(&errors, config) {
            break;
        }
    }

    let rank = select_rank(
        &errors,
        config.cv_metric,
        config.cv_relative_tolerance,
        config.cv_decrease_tolerance,
    );
    Ok(CrossValidationResult { rank, errors })
}
