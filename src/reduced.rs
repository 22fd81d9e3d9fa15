//! Reduced-space model.
//!
//! [`ReducedModel`] evaluates a full-space model at the image of a reduced
//! point and maps the response back through the chain rule. It implements
//! [`FullSpaceModel`] itself, so reduced models can be sampled, nested or
//! handed to any consumer of the full-space interface.

use std::sync::Arc;

use ndarray::Array1;

use crate::error::{Result, SubspaceError};
use crate::model::{ActiveSet, FullSpaceModel, Response};
use crate::subspace::rotation::{SubspaceRotationModel, VariableTransform};

struct Mapping {
    rotation: Arc<SubspaceRotationModel>,
    transform: VariableTransform,
}

/// Full-space model evaluated in reduced coordinates.
pub struct ReducedModel<M: FullSpaceModel> {
    full: M,
    mapping: Option<Mapping>,
}

impl<M: FullSpaceModel> ReducedModel<M> {
    /// Wrap `full` without a rotation; evaluation fails until `initialize`.
    pub fn new(full: M) -> Self {
        Self { full, mapping: None }
    }

    /// Wrap `full` with an existing rotation.
    pub fn with_rotation(full: M, rotation: Arc<SubspaceRotationModel>) -> Result<Self> {
        let mut model = Self::new(full);
        model.initialize(rotation)?;
        Ok(model)
    }

    /// Bind the rotation used for every subsequent evaluation.
    pub fn initialize(&mut self, rotation: Arc<SubspaceRotationModel>) -> Result<()> {
        if rotation.num_full_variables() != self.full.num_variables() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "rotation acts on {} variables, full model takes {}",
                rotation.num_full_variables(),
                self.full.num_variables()
            )));
        }
        let transform = SubspaceRotationModel::variable_transform(&rotation);
        self.mapping = Some(Mapping { rotation, transform });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn full_model(&self) -> &M {
        &self.full
    }

    pub fn rotation(&self) -> Result<&Arc<SubspaceRotationModel>> {
        self.mapping
            .as_ref()
            .map(|m| &m.rotation)
            .ok_or_else(|| SubspaceError::Uninitialized("reduced model has no rotation".to_string()))
    }

    /// Full-space point for the reduced point `y`.
    pub fn to_full(&self, y: &Array1<f64>) -> Result<Array1<f64>> {
        let mapping = self.mapping.as_ref().ok_or_else(|| {
            SubspaceError::Uninitialized("reduced model evaluated before its rotation was set".to_string())
        })?;
        (mapping.transform)(y.view())
    }
}

impl<M: FullSpaceModel> FullSpaceModel for ReducedModel<M> {
    /// The reduced rank, or 0 before initialization.
    fn num_variables(&self) -> usize {
        self.mapping.as_ref().map_or(0, |m| m.rotation.rank())
    }

    fn num_functions(&self) -> usize {
        self.full.num_functions()
    }

    fn evaluate(&self, y: &Array1<f64>, request: ActiveSet) -> Result<Response> {
        let x = self.to_full(y)?;
        let rotation = self.rotation()?;
        let full_request = rotation.expand_active_set(request);
        if full_request.hessians() && !self.full.supports_hessians() {
            return Err(SubspaceError::Configuration(
                "reduced Hessians need Hessians from the full-space model".to_string(),
            ));
        }
        let response = self.full.evaluate(&x, full_request)?;
        rotation.transform_response(&response)
    }

    fn supports_gradients(&self) -> bool {
        self.full.supports_gradients()
    }

    fn supports_hessians(&self) -> bool {
        self.full.supports_hessians()
    }

    fn derivative_concurrency(&self) -> usize {
        self.full.derivative_concurrency()
    }
}
