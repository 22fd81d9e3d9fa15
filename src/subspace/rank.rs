//! # Subspace Rank Selection
//!
//! Chooses the dimension of the active subspace from the SVD of the derivative
//! matrix. Up to four criteria run and the largest rank any of them selects
//! wins:
//!
//! - **energy**: smallest `r` whose trailing squared singular values carry less
//!   than `truncation_tolerance` of the total;
//! - **Bing Li**: the "ladle" estimator, the first local minimum of normalized
//!   eigenvalue magnitude plus normalized bootstrap basis instability;
//! - **Constantine**: the rank whose leading subspace varies least across
//!   bootstrap replicates, measured by projection-matrix distance;
//! - **cross-validation**: see [`super::cross_validation`].
//!
//! A user rank bypasses the criteria. Either way the result goes through a
//! numerical-rank check against `||D||_inf * eps` that can only lower it.
//!
//! References:
//! - B. Luo and B. Li, "Combining eigenvalues and variation of eigenvectors
//!   for order determination", Biometrika 103 (2016).
//! - P. Constantine, Active Subspaces, SIAM (2015), section 3.3.

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubspaceError};
use crate::linalg::{determinant, frobenius_norm, numerical_rank_threshold, svd, SvdResult};
use crate::utils::map_replicates;

use super::bootstrap::{BootstrapRngState, BootstrapSampler};
use super::config::SubspaceConfig;
use super::cross_validation::{cross_validation_criterion, CrossValidationData};

/// Outcome of rank selection, including every candidate estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSelection {
    /// Final reduced rank
    pub rank: usize,

    /// The user rank was within range and used directly
    pub user_rank_used: bool,

    /// Energy criterion estimate, when it ran
    pub energy: Option<usize>,

    /// Bing Li criterion estimate, when it ran
    pub bing_li: Option<usize>,

    /// Constantine criterion estimate, when it ran
    pub constantine: Option<usize>,

    /// Cross-validation estimate, when it ran
    pub cross_validation: Option<usize>,

    /// Averaged bootstrap projection distance per candidate rank (Constantine)
    pub constantine_metric: Vec<f64>,

    /// Cross-validation error per candidate rank
    pub cv_errors: Vec<f64>,

    /// The numerical-rank check lowered the rank
    pub numerically_downgraded: bool,

    /// The rank reached the sample-size guideline
    pub sample_size_warning: bool,
}

/// Energy criterion: smallest `r` with `1 - sum_{i<r} s_i^2 / sum s_i^2 < tol`,
/// or 0 when no `r` qualifies.
pub fn energy_criterion(singular_values: &Array1<f64>, truncation_tolerance: f64) -> usize {
    let eigenvalues: Vec<f64> = singular_values.iter().map(|s| s * s).collect();
    let total: f64 = eigenvalues.iter().sum();
    if !(total > 0.0) {
        return 0;
    }

    let mut cumulative = 0.0;
    for (i, e) in eigenvalues.iter().enumerate() {
        cumulative += e;
        if 1.0 - cumulative / total < truncation_tolerance {
            return i + 1;
        }
    }
    0
}

// Bootstrap indices are drawn up front, in replicate order, so the random
// stream does not depend on how the replicates are scheduled.
fn draw_replicates<'a>(
    derivatives: ArrayView2<'a, f64>,
    num_functions: usize,
    num_replicates: usize,
    rng: &mut BootstrapRngState,
) -> Result<(BootstrapSampler<'a>, Vec<Vec<usize>>)> {
    let sampler = BootstrapSampler::new(derivatives, num_functions)?;
    let draws = (0..num_replicates)
        .map(|_| sampler.draw_indices(rng))
        .collect();
    Ok((sampler, draws))
}

/// Bing Li's ladle criterion.
///
/// For candidate size `k` (0-based), the score is
/// `lambda_k / sum(lambda) + f_k / sum(f)` where `f_k` is the bootstrap mean of
/// `1 - |det(U_k^T U*_k)|` over the leading `k` left singular vectors of the
/// original (`U`) and resampled (`U*`) matrices, with `f_0 = 0`. Returns the
/// first `k` with `score[k] < score[k + 1]`, or 0 if there is none.
pub fn bing_li_criterion(
    derivatives: ArrayView2<'_, f64>,
    num_functions: usize,
    decomposition: &SvdResult,
    num_replicates: usize,
    rng: &mut BootstrapRngState,
) -> Result<usize> {
    let singular_values = &decomposition.singular_values;
    let left = &decomposition.left_singular_vectors;
    let num_candidates = singular_values.len().min(left.nrows());
    if num_candidates < 2 {
        return Ok(0);
    }

    let (sampler, draws) = draw_replicates(derivatives, num_functions, num_replicates, rng)?;
    let deficits = map_replicates(draws, |indices| {
        let mut replicate = Array2::zeros(sampler.output_dim());
        sampler.resample_with(&indices, &mut replicate)?;
        let boot = svd(replicate.view())?;
        let mut deficit = vec![0.0; num_candidates];
        for (k, d) in deficit.iter_mut().enumerate().skip(1) {
            let overlap = left
                .slice(s![.., ..k])
                .t()
                .dot(&boot.left_singular_vectors.slice(s![.., ..k]));
            *d = 1.0 - determinant(overlap.view())?.abs();
        }
        Ok(deficit)
    })?;

    let mut f = vec![0.0; num_candidates];
    for deficit in &deficits {
        for (acc, d) in f.iter_mut().zip(deficit) {
            *acc += d;
        }
    }
    for v in f.iter_mut() {
        *v /= num_replicates as f64;
    }

    let eigenvalues: Vec<f64> = singular_values.iter().map(|s| s * s).collect();
    let eigen_sum: f64 = eigenvalues.iter().sum();
    let f_sum: f64 = f.iter().sum();
    let scores: Vec<f64> = (0..num_candidates)
        .map(|k| {
            let phi = if eigen_sum > 0.0 { eigenvalues[k] / eigen_sum } else { 0.0 };
            let g = if f_sum > 0.0 { f[k] / f_sum } else { 0.0 };
            phi + g
        })
        .collect();
    debug!("Bing Li scores: {:?}", scores);

    for k in 1..num_candidates {
        if scores[k - 1] < scores[k] {
            return Ok(k - 1);
        }
    }
    Ok(0)
}

/// Frobenius distance `||U U^T - V V^T||_F` between the projectors onto the
/// column spans of two orthonormal bases.
fn projection_distance(u: ArrayView2<'_, f64>, v: ArrayView2<'_, f64>) -> f64 {
    let difference = u.dot(&u.t()) - v.dot(&v.t());
    frobenius_norm(difference.view())
}

/// Constantine's bootstrap metric.
///
/// For every candidate rank `j` in `1..=min(num_singular_values, num_vars - 1)`,
/// the metric is the bootstrap mean of `||P_j - P*_j||_F`. Returns the
/// 1-based global argmin (the first one on ties) and the metric sequence.
pub fn constantine_criterion(
    derivatives: ArrayView2<'_, f64>,
    num_functions: usize,
    decomposition: &SvdResult,
    num_replicates: usize,
    rng: &mut BootstrapRngState,
) -> Result<(usize, Vec<f64>)> {
    let left = &decomposition.left_singular_vectors;
    let num_vars = left.nrows();
    let num_candidates = decomposition
        .singular_values
        .len()
        .min(num_vars.saturating_sub(1));
    if num_candidates == 0 {
        return Ok((1, Vec::new()));
    }

    let (sampler, draws) = draw_replicates(derivatives, num_functions, num_replicates, rng)?;
    let distances = map_replicates(draws, |indices| {
        let mut replicate = Array2::zeros(sampler.output_dim());
        sampler.resample_with(&indices, &mut replicate)?;
        let boot = svd(replicate.view())?;
        Ok((1..=num_candidates)
            .map(|j| {
                projection_distance(
                    left.slice(s![.., ..j]),
                    boot.left_singular_vectors.slice(s![.., ..j]),
                )
            })
            .collect::<Vec<f64>>())
    })?;

    let mut metric = vec![0.0; num_candidates];
    for replicate in &distances {
        for (acc, d) in metric.iter_mut().zip(replicate) {
            *acc += d;
        }
    }
    for m in metric.iter_mut() {
        *m /= num_replicates as f64;
    }
    debug!("Constantine metric: {:?}", metric);

    let mut best = 0;
    for (i, &m) in metric.iter().enumerate() {
        if m < metric[best] {
            best = i;
        }
    }
    Ok((best + 1, metric))
}

/// Lower `rank` to the numerical rank when its last singular value falls below
/// `threshold`. Returns the checked rank and whether it changed.
///
/// A rank of 0 on input, or a numerical rank of 0, is fatal.
pub fn numerical_rank_check(
    singular_values: &Array1<f64>,
    threshold: f64,
    rank: usize,
) -> Result<(usize, bool)> {
    if rank == 0 {
        return Err(SubspaceError::NumericalRankDeficient(
            "rank selection produced rank 0".to_string(),
        ));
    }
    if rank > singular_values.len() {
        return Err(SubspaceError::DimensionMismatch(format!(
            "rank {} exceeds the {} available singular values",
            rank,
            singular_values.len()
        )));
    }
    if singular_values[rank - 1] >= threshold {
        return Ok((rank, false));
    }

    let numerical = singular_values
        .iter()
        .position(|&s| s < threshold)
        .unwrap_or(rank);
    if numerical == 0 {
        return Err(SubspaceError::NumericalRankDeficient(format!(
            "derivative matrix has numerical rank 0 (largest singular value {:e} below {:e})",
            singular_values[0], threshold
        )));
    }
    Ok((numerical, true))
}

/// Constantine's sample-size guideline `ceil(samples / (2 log10(num_vars)))`;
/// `None` when it is undefined (a single variable).
pub fn sample_size_guideline(initial_samples: usize, num_vars: usize) -> Option<usize> {
    if num_vars < 2 {
        return None;
    }
    Some((initial_samples as f64 / (2.0 * (num_vars as f64).log10())).ceil() as usize)
}

/// Rank selection over one SVD of the derivative matrix.
pub struct RankSelectionEngine<'a> {
    derivatives: ArrayView2<'a, f64>,
    num_functions: usize,
    decomposition: &'a SvdResult,
    config: &'a SubspaceConfig,
    cv_data: Option<CrossValidationData<'a>>,
}

impl<'a> RankSelectionEngine<'a> {
    /// Bind the engine to a derivative matrix and its SVD.
    ///
    /// Fails with `NoSingularValues` when the spectrum is empty.
    pub fn new(
        derivatives: ArrayView2<'a, f64>,
        num_functions: usize,
        decomposition: &'a SvdResult,
        config: &'a SubspaceConfig,
    ) -> Result<Self> {
        if decomposition.singular_values.is_empty() {
            return Err(SubspaceError::NoSingularValues);
        }
        Ok(Self {
            derivatives,
            num_functions,
            decomposition,
            config,
            cv_data: None,
        })
    }

    /// Sample points and function values for the cross-validation criterion.
    pub fn with_cross_validation_data(mut self, data: CrossValidationData<'a>) -> Self {
        self.cv_data = Some(data);
        self
    }

    fn num_vars(&self) -> usize {
        self.decomposition.left_singular_vectors.nrows()
    }

    /// Run the selection.
    pub fn select(&self, rng: &mut BootstrapRngState) -> Result<RankSelection> {
        let singular_values = &self.decomposition.singular_values;
        let mut selection = RankSelection {
            rank: 0,
            user_rank_used: false,
            energy: None,
            bing_li: None,
            constantine: None,
            cross_validation: None,
            constantine_metric: Vec::new(),
            cv_errors: Vec::new(),
            numerically_downgraded: false,
            sample_size_warning: false,
        };

        match self.config.user_rank {
            Some(r) if r >= 1 && r <= singular_values.len() => {
                info!("Using user-specified subspace rank {}", r);
                selection.rank = r;
                selection.user_rank_used = true;
            }
            other => {
                if let Some(r) = other {
                    warn!(
                        "Requested subspace rank {} is outside 1..={}; selecting the rank automatically",
                        r,
                        singular_values.len()
                    );
                }
                self.run_criteria(rng, &mut selection)?;
            }
        }

        let threshold = numerical_rank_threshold(self.derivatives);
        let (rank, downgraded) = numerical_rank_check(singular_values, threshold, selection.rank)?;
        if downgraded {
            warn!(
                "Subspace rank {} exceeds the numerical rank of the derivative matrix; using {}",
                selection.rank, rank
            );
        }
        selection.rank = rank;
        selection.numerically_downgraded = downgraded;

        let initial_samples = self.config.initial_samples;
        if let Some(limit) = sample_size_guideline(initial_samples, self.num_vars()) {
            if rank >= limit {
                warn!(
                    "Subspace rank {} reaches the sample-size guideline {} for {} initial samples; \
                     the subspace may be inaccurate",
                    rank, limit, initial_samples
                );
                selection.sample_size_warning = true;
            }
        }

        info!("Selected subspace rank {}", selection.rank);
        Ok(selection)
    }

    fn run_criteria(&self, rng: &mut BootstrapRngState, selection: &mut RankSelection) -> Result<()> {
        let criteria = self.config.criteria.effective();
        let mut rank = 0;

        if criteria.energy {
            let r = energy_criterion(
                &self.decomposition.singular_values,
                self.config.truncation_tolerance,
            );
            info!("Energy criterion rank: {}", r);
            selection.energy = Some(r);
            rank = rank.max(r);
        }

        if criteria.bing_li {
            let r = bing_li_criterion(
                self.derivatives,
                self.num_functions,
                self.decomposition,
                self.config.num_replicates,
                rng,
            )?;
            info!("Bing Li criterion rank: {}", r);
            selection.bing_li = Some(r);
            rank = rank.max(r);
        }

        if criteria.constantine {
            let (r, metric) = constantine_criterion(
                self.derivatives,
                self.num_functions,
                self.decomposition,
                self.config.num_replicates,
                rng,
            )?;
            info!("Constantine criterion rank: {}", r);
            selection.constantine = Some(r);
            selection.constantine_metric = metric;
            rank = rank.max(r);
        }

        if criteria.cross_validation {
            let data = self.cv_data.as_ref().ok_or_else(|| {
                SubspaceError::InsufficientData(
                    "cross-validation rank selection needs sample points and function values"
                        .to_string(),
                )
            })?;
            let result = cross_validation_criterion(
                &self.decomposition.left_singular_vectors,
                data,
                self.config,
                rng,
            )?;
            info!("Cross-validation rank: {}", result.rank);
            selection.cross_validation = Some(result.rank);
            selection.cv_errors = result.errors;
            rank = rank.max(result.rank);
        }

        selection.rank = rank;
        Ok(())
    }
}
