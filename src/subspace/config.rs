//! Configuration options for subspace discovery.
//!
//! This module defines the settings of a subspace build: sample counts and
//! refinement batches, gradient normalization, which rank-selection criteria
//! run and their tolerances, and the adapted-basis truncation threshold.
//! Configurations are plain data and can be loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubspaceError};

/// How sampled gradients are scaled before they enter the derivative matrix.
///
/// Every mode other than `None` only takes effect with more than one response
/// function, where it makes gradient magnitudes of different responses comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Use gradients as returned by the model
    #[default]
    None,

    /// Divide by the batch mean of `|f|` for each response function
    MeanValue,

    /// Divide by the batch mean of `||grad f||` for each response function
    MeanGradient,

    /// Divide each gradient column by `|f|` at its own sample
    LocalValue,

    /// Scale each gradient column to unit norm
    LocalGradient,
}

impl Normalization {
    /// Whether function values are needed alongside gradients.
    pub fn needs_values(self) -> bool {
        matches!(self, Normalization::MeanValue | Normalization::LocalValue)
    }
}

/// Rank-selection criteria to run. The selected rank is the maximum over the
/// enabled criteria; with none enabled, Constantine's criterion runs alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RankCriteria {
    /// Cumulative singular-value energy truncation. Default: false
    pub energy: bool,

    /// Bing Li's bootstrap ladle criterion. Default: false
    pub bing_li: bool,

    /// Constantine's bootstrap subspace-distance metric. Default: false
    pub constantine: bool,

    /// Cross-validated surrogate error. Default: false
    pub cross_validation: bool,
}

impl RankCriteria {
    /// Whether no criterion was explicitly enabled.
    pub fn none_enabled(&self) -> bool {
        !(self.energy || self.bing_li || self.constantine || self.cross_validation)
    }

    /// The criteria that will actually run.
    pub fn effective(&self) -> RankCriteria {
        if self.none_enabled() {
            RankCriteria {
                constantine: true,
                ..Default::default()
            }
        } else {
            *self
        }
    }

    /// Whether an enabled criterion resamples the derivative matrix.
    pub fn uses_bootstrap(&self) -> bool {
        let effective = self.effective();
        effective.bing_li || effective.constantine
    }
}

/// Policy picking a rank from the cross-validation error curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CvMetric {
    /// Global minimum of the curve
    #[default]
    Minimum,

    /// First rank whose error falls below the relative tolerance
    Relative,

    /// First rank after which the error decrease falls below the decrease tolerance
    Decrease,
}

/// Configuration of a subspace build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubspaceConfig {
    /// Samples drawn in the initial batch. Default: 100
    pub initial_samples: usize,

    /// Number of refinement batches drawn after the initial one. Default: 0
    pub refinement_iterations: usize,

    /// Samples per refinement batch: empty, one entry used for every batch, or
    /// one entry per refinement iteration. Default: empty
    pub refinement_samples: Vec<usize>,

    /// Seed for the sampler and bootstrap generator; `None` seeds from entropy. Default: Some(0)
    pub seed: Option<u64>,

    /// Random generator name, `"chacha8"` or `"std"`. Default: "chacha8"
    pub rng_name: String,

    /// Gradient normalization. Default: None
    pub normalization: Normalization,

    /// User-specified rank; skips the criteria when within `1..=num_singular_values`. Default: None
    pub user_rank: Option<usize>,

    /// Criteria to combine. Default: all false (Constantine runs alone)
    pub criteria: RankCriteria,

    /// Bootstrap replicates for the Bing Li and Constantine criteria. Default: 100
    pub num_replicates: usize,

    /// Energy criterion tolerance on `1 - cumulative energy`. Default: 1e-6
    pub truncation_tolerance: f64,

    /// Number of cross-validation folds. Default: 10
    pub cv_folds: usize,

    /// Cap on the largest rank the cross-validation criterion tries. Default: None
    pub cv_max_rank: Option<usize>,

    /// Cross-validation selection policy. Default: Minimum
    pub cv_metric: CvMetric,

    /// Tolerance of the `Relative` policy. Default: 1e-6
    pub cv_relative_tolerance: f64,

    /// Tolerance of the `Decrease` policy. Default: 1e-6
    pub cv_decrease_tolerance: f64,

    /// Stop trying larger ranks once the selection policy is satisfied. Default: false
    pub cv_incremental: bool,

    /// Fit a moving least squares surrogate over the final reduced coordinates. Default: false
    pub build_surrogate: bool,

    /// Adapted-basis truncation threshold on the cumulative gap reduction. Default: 0.8
    pub truncation_threshold: f64,

    /// Rank the adapted-basis completion directions by sensitivity. Default: true
    pub sensitivity_ranked: bool,
}

impl Default for SubspaceConfig {
    fn default() -> Self {
        Self {
            initial_samples: 100,
            refinement_iterations: 0,
            refinement_samples: Vec::new(),
            seed: Some(0),
            rng_name: "chacha8".to_string(),
            normalization: Normalization::default(),
            user_rank: None,
            criteria: RankCriteria::default(),
            num_replicates: 100,
            truncation_tolerance: 1e-6,
            cv_folds: 10,
            cv_max_rank: None,
            cv_metric: CvMetric::default(),
            cv_relative_tolerance: 1e-6,
            cv_decrease_tolerance: 1e-6,
            cv_incremental: false,
            build_surrogate: false,
            truncation_threshold: 0.8,
            sensitivity_ranked: true,
        }
    }
}

impl SubspaceConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SubspaceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Samples drawn in refinement iteration `iteration` (0-based).
    pub fn refinement_batch(&self, iteration: usize) -> Option<usize> {
        match self.refinement_samples.len() {
            0 => None,
            1 => Some(self.refinement_samples[0]),
            _ => self.refinement_samples.get(iteration).copied(),
        }
    }

    /// Check every user setting.
    pub fn validate(&self) -> Result<()> {
        if self.initial_samples < 2 {
            return Err(SubspaceError::Configuration(format!(
                "initial_samples must be at least 2, got {}",
                self.initial_samples
            )));
        }
        if self.refinement_samples.iter().any(|&n| n == 0) {
            return Err(SubspaceError::Configuration(
                "refinement_samples entries must be positive".to_string(),
            ));
        }
        let len = self.refinement_samples.len();
        if self.refinement_iterations > 0 && len == 0 {
            return Err(SubspaceError::Configuration(format!(
                "{} refinement iterations requested but refinement_samples is empty",
                self.refinement_iterations
            )));
        }
        if len > 1 && len != self.refinement_iterations {
            return Err(SubspaceError::Configuration(format!(
                "refinement_samples has {} entries; expected 1 or refinement_iterations ({})",
                len, self.refinement_iterations
            )));
        }
        if self.user_rank == Some(0) {
            return Err(SubspaceError::Configuration(
                "user_rank must be at least 1".to_string(),
            ));
        }
        if self.criteria.uses_bootstrap() && self.num_replicates == 0 {
            return Err(SubspaceError::Configuration(
                "num_replicates must be positive for bootstrap criteria".to_string(),
            ));
        }
        if !(self.truncation_tolerance > 0.0 && self.truncation_tolerance <= 1.0) {
            return Err(SubspaceError::Configuration(format!(
                "truncation_tolerance must lie in (0, 1], got {}",
                self.truncation_tolerance
            )));
        }
        if self.cv_folds < 2 {
            return Err(SubspaceError::Configuration(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.cv_max_rank == Some(0) {
            return Err(SubspaceError::Configuration(
                "cv_max_rank must be at least 1".to_string(),
            ));
        }
        if self.cv_relative_tolerance < 0.0 || self.cv_decrease_tolerance < 0.0 {
            return Err(SubspaceError::Configuration(
                "cross-validation tolerances must be non-negative".to_string(),
            ));
        }
        if !(self.truncation_threshold > 0.0 && self.truncation_threshold <= 1.0) {
            return Err(SubspaceError::Configuration(format!(
                "truncation_threshold must lie in (0, 1], got {}",
                self.truncation_threshold
            )));
        }
        Ok(())
    }

    /// Reject a user rank outside `1..=num_variables`.
    pub fn check_rank_domain(&self, num_variables: usize) -> Result<()> {
        match self.user_rank {
            Some(r) if r == 0 || r > num_variables => Err(SubspaceError::Configuration(format!(
                "user_rank {} is outside 1..={} for {} full-space variables",
                r, num_variables, num_variables
            ))),
            _ => Ok(()),
        }
    }
}
