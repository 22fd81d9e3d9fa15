//! Basis constructors.
//!
//! A constructor samples the full-space model and produces an orthogonal basis
//! of the input space together with the rank at which to split it. Everything
//! downstream (rotation, reduced model, surrogate) is shared between
//! constructors.

use log::{debug, info};
use ndarray::Array2;

use crate::error::{Result, SubspaceError};
use crate::linalg::{svd, SvdResult};
use crate::model::FullSpaceModel;
use crate::sampling::DaceSampler;
use crate::variables::UncertainVariables;

use super::accumulator::DerivativeSampleAccumulator;
use super::bootstrap::BootstrapRngState;
use super::config::SubspaceConfig;
use super::cross_validation::CrossValidationData;
use super::rank::{RankSelection, RankSelectionEngine};
use super::report::BuildStatistics;
use super::rotation::CoordinateFrame;

/// Basis produced by a constructor.
#[derive(Debug, Clone)]
pub struct ConstructedBasis {
    /// Orthogonal `num_vars x num_vars` matrix, basis vectors as columns,
    /// most important first
    pub rotation: Array2<f64>,

    /// Number of leading columns forming the active basis
    pub rank: usize,

    /// Coordinates `rotation` acts on
    pub frame: CoordinateFrame,

    pub statistics: BuildStatistics,
}

/// Full-space sample points (`num_vars x n`) and their values (`num_fns x n`).
pub type TrainingData = (Array2<f64>, Array2<f64>);

/// Strategy that discovers the reduced basis.
pub trait BasisConstructor {
    /// Short method name used in reports.
    fn method(&self) -> &'static str;

    /// Sample `model` and build the basis.
    fn construct(
        &mut self,
        model: &dyn FullSpaceModel,
        variables: &UncertainVariables,
        config: &SubspaceConfig,
    ) -> Result<ConstructedBasis>;

    /// Sample points with function values gathered so far, if values were kept.
    fn training_data(&self) -> Option<TrainingData>;

    /// Draw `num_samples` more points with function values.
    fn draw_additional(
        &mut self,
        model: &dyn FullSpaceModel,
        variables: &UncertainVariables,
        config: &SubspaceConfig,
        num_samples: usize,
    ) -> Result<usize>;
}

/// Active subspace discovery: SVD of sampled gradients plus rank selection.
pub struct ActiveSubspaceConstructor<S: DaceSampler> {
    accumulator: DerivativeSampleAccumulator<S>,
}

impl<S: DaceSampler> ActiveSubspaceConstructor<S> {
    /// Wrap `sampler` for a model with `num_functions` responses.
    pub fn new(sampler: S, num_functions: usize, config: &SubspaceConfig) -> Self {
        let keep_values = config.build_surrogate || config.criteria.effective().cross_validation;
        let accumulator = DerivativeSampleAccumulator::new(
            sampler,
            num_functions,
            config.normalization,
            config.seed,
            &config.rng_name,
        )
        .with_values(keep_values);
        Self { accumulator }
    }

    pub fn accumulator(&self) -> &DerivativeSampleAccumulator<S> {
        &self.accumulator
    }

    // Rebuild from the whole accumulated matrix.
    fn rebuild(
        &self,
        config: &SubspaceConfig,
        rng: &mut BootstrapRngState,
    ) -> Result<(SvdResult, RankSelection)> {
        let derivatives = self.accumulator.derivative_matrix();
        let decomposition = svd(derivatives.view())?;
        debug!("Derivative singular values: {}", decomposition.singular_values);

        let mut engine = RankSelectionEngine::new(
            derivatives.view(),
            derivatives.num_functions(),
            &decomposition,
            config,
        )?;
        if let Some(values) = self.accumulator.values_matrix() {
            engine = engine.with_cross_validation_data(CrossValidationData::new(
                self.accumulator.variables_matrix().view(),
                values,
            )?);
        }
        let selection = engine.select(rng)?;
        Ok((decomposition, selection))
    }
}

impl<S: DaceSampler> BasisConstructor for ActiveSubspaceConstructor<S> {
    fn method(&self) -> &'static str {
        "active_subspace"
    }

    fn construct(
        &mut self,
        model: &dyn FullSpaceModel,
        _variables: &UncertainVariables,
        config: &SubspaceConfig,
    ) -> Result<ConstructedBasis> {
        config.check_rank_domain(self.accumulator.num_variables())?;
        self.accumulator.clear();
        let mut rng = BootstrapRngState::new(config.seed);

        self.accumulator
            .generate_and_accumulate(model, config.initial_samples)?;
        let (mut decomposition, mut selection) = self.rebuild(config, &mut rng)?;

        for iteration in 0..config.refinement_iterations {
            let batch = config.refinement_batch(iteration).ok_or_else(|| {
                SubspaceError::Configuration(format!(
                    "no refinement sample count for iteration {}",
                    iteration
                ))
            })?;
            info!(
                "Refinement iteration {}: drawing {} samples",
                iteration + 1,
                batch
            );
            self.accumulator.generate_and_accumulate(model, batch)?;
            let (d, s) = self.rebuild(config, &mut rng)?;
            decomposition = d;
            selection = s;
        }

        let mut statistics = BuildStatistics::new(
            self.method(),
            self.accumulator.num_variables(),
            self.accumulator.num_functions(),
        );
        statistics.rank = selection.rank;
        statistics.total_samples = self.accumulator.total_samples();
        statistics.singular_values = decomposition.singular_values.to_vec();
        statistics.rank_selection = Some(selection);

        Ok(ConstructedBasis {
            rotation: decomposition.left_singular_vectors,
            rank: statistics.rank,
            frame: CoordinateFrame::Physical,
            statistics,
        })
    }

    fn training_data(&self) -> Option<TrainingData> {
        let values = self.accumulator.values_matrix()?;
        Some((
            self.accumulator.variables_matrix().view().to_owned(),
            values.to_owned(),
        ))
    }

    fn draw_additional(
        &mut self,
        model: &dyn FullSpaceModel,
        _variables: &UncertainVariables,
        _config: &SubspaceConfig,
        num_samples: usize,
    ) -> Result<usize> {
        self.accumulator.generate_and_accumulate(model, num_samples)
    }
}
