//! # Subspace Build Driver
//!
//! Runs one complete subspace build: validates the configuration, lets a
//! [`BasisConstructor`] sample the model and pick a rank, binds the resulting
//! basis to the uncertain variables as a [`SubspaceRotationModel`], and
//! optionally fits a quadratic moving least squares surrogate over the reduced
//! coordinates.
//!
//! # Example
//!
//! ```no_run
//! use ndarray::{arr1, Array2};
//! use subspace_uq::model::ClosureModel;
//! use subspace_uq::sampling::MonteCarloSampler;
//! use subspace_uq::subspace::{ActiveSubspaceConstructor, SubspaceBuilder, SubspaceConfig};
//! use subspace_uq::variables::UncertainVariables;
//!
//! let model = ClosureModel::new(3, 1, |x| arr1(&[(x[0] + x[1]).powi(2)]))
//!     .with_gradients(|x| {
//!         let t = 2.0 * (x[0] + x[1]);
//!         Array2::from_shape_vec((3, 1), vec![t, t, 0.0]).unwrap()
//!     });
//! let variables = UncertainVariables::standard_normals(3)?;
//! let config = SubspaceConfig::default();
//!
//! let sampler = MonteCarloSampler::new(variables.clone(), config.initial_samples, config.seed)?;
//! let mut constructor = ActiveSubspaceConstructor::new(sampler, 1, &config);
//! let build = SubspaceBuilder::new(config, variables)?.build(&model, &mut constructor)?;
//! println!("reduced rank {}", build.rotation().rank());
//! # Ok::<(), subspace_uq::SubspaceError>(())
//! ```

use std::sync::Arc;

use log::{info, warn};

use crate::error::{Result, SubspaceError};
use crate::model::FullSpaceModel;
use crate::reduced::ReducedModel;
use crate::surrogate::{MovingLeastSquares, SurrogateFitter};
use crate::variables::UncertainVariables;

use super::config::SubspaceConfig;
use super::constructor::BasisConstructor;
use super::report::BuildStatistics;
use super::rotation::SubspaceRotationModel;

/// Result of a subspace build.
#[derive(Debug)]
pub struct SubspaceBuild {
    rotation: Arc<SubspaceRotationModel>,
    statistics: BuildStatistics,
    surrogate: Option<MovingLeastSquares>,
}

impl SubspaceBuild {
    pub fn rotation(&self) -> &Arc<SubspaceRotationModel> {
        &self.rotation
    }

    pub fn statistics(&self) -> &BuildStatistics {
        &self.statistics
    }

    /// Surrogate over the reduced coordinates, when one was requested.
    pub fn surrogate(&self) -> Option<&MovingLeastSquares> {
        self.surrogate.as_ref()
    }

    /// Wrap `full` so it is evaluated in reduced coordinates.
    pub fn reduced_model<M: FullSpaceModel>(&self, full: M) -> Result<ReducedModel<M>> {
        ReducedModel::with_rotation(full, Arc::clone(&self.rotation))
    }
}

/// Driver for subspace builds.
pub struct SubspaceBuilder {
    config: SubspaceConfig,
    variables: UncertainVariables,
}

impl SubspaceBuilder {
    /// Validate `config` and bind it to the uncertain variables.
    pub fn new(config: SubspaceConfig, variables: UncertainVariables) -> Result<Self> {
        config.validate()?;
        config.check_rank_domain(variables.num_variables())?;
        Ok(Self { config, variables })
    }

    pub fn config(&self) -> &SubspaceConfig {
        &self.config
    }

    pub fn variables(&self) -> &UncertainVariables {
        &self.variables
    }

    /// Run a build of `model` with `constructor`.
    pub fn build<C>(&self, model: &dyn FullSpaceModel, constructor: &mut C) -> Result<SubspaceBuild>
    where
        C: BasisConstructor + ?Sized,
    {
        if model.num_variables() != self.variables.num_variables() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "model takes {} variables, {} are uncertain",
                model.num_variables(),
                self.variables.num_variables()
            )));
        }

        info!(
            "Building {} for {} variables and {} responses",
            constructor.method(),
            model.num_variables(),
            model.num_functions()
        );
        let basis = constructor.construct(model, &self.variables, &self.config)?;
        let rotation = Arc::new(SubspaceRotationModel::new(
            basis.rotation,
            basis.rank,
            &self.variables,
            basis.frame,
        )?);
        let mut statistics = basis.statistics;

        let surrogate = if self.config.build_surrogate {
            let (surrogate, extra) = self.fit_surrogate(model, constructor, &rotation)?;
            statistics.surrogate_refinement_samples = extra;
            statistics.total_samples += extra;
            Some(surrogate)
        } else {
            None
        };

        info!(
            "Subspace build finished: rank {} from {} samples",
            rotation.rank(),
            statistics.total_samples
        );
        Ok(SubspaceBuild {
            rotation,
            statistics,
            surrogate,
        })
    }

    // Draws extra samples, with a warning, until the quadratic fit is determined.
    fn fit_surrogate<C>(
        &self,
        model: &dyn FullSpaceModel,
        constructor: &mut C,
        rotation: &SubspaceRotationModel,
    ) -> Result<(MovingLeastSquares, usize)>
    where
        C: BasisConstructor + ?Sized,
    {
        let mut surrogate = MovingLeastSquares::new(rotation.rank(), model.num_functions());
        let required = surrogate.required_points(rotation.rank());

        let available = constructor
            .training_data()
            .map_or(0, |(x, _)| x.ncols());
        let mut extra = 0;
        if available < required {
            extra = required - available;
            warn!(
                "Surrogate over {} reduced variables needs {} points but {} are available; \
                 drawing {} refinement samples",
                rotation.rank(),
                required,
                available,
                extra
            );
            constructor.draw_additional(model, &self.variables, &self.config, extra)?;
        }

        let (x, values) = constructor.training_data().ok_or_else(|| {
            SubspaceError::InsufficientData(
                "basis constructor kept no function values for the surrogate".to_string(),
            )
        })?;
        let reduced = rotation.to_reduced_matrix(x.view())?;
        surrogate.append_training_data(reduced.view(), values.view())?;
        surrogate.build()?;
        Ok((surrogate, extra))
    }
}
