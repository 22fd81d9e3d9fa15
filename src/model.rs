//! Full-space model definition trait and implementations.
//!
//! This module defines the `FullSpaceModel` trait, which represents the expensive
//! black-box simulation whose input space is being reduced. It also provides the
//! `ActiveSet` request mask and the `Response` container returned by an evaluation.

use ndarray::{Array1, Array2};
use std::fmt;
use std::ops::BitOr;

use crate::error::{Result, SubspaceError};

/// Request mask describing which response data an evaluation must produce.
///
/// Bit 1 requests function values, bit 2 gradients and bit 4 Hessians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActiveSet(u8);

impl ActiveSet {
    /// Function values only.
    pub const VALUES: ActiveSet = ActiveSet(1);
    /// Gradients only.
    pub const GRADIENTS: ActiveSet = ActiveSet(2);
    /// Hessians only.
    pub const HESSIANS: ActiveSet = ActiveSet(4);

    /// Build a mask from its raw bits.
    pub fn from_bits(bits: u8) -> Self {
        ActiveSet(bits & 7)
    }

    /// Raw bits of the mask.
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn values(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn gradients(self) -> bool {
        self.0 & 2 != 0
    }

    pub fn hessians(self) -> bool {
        self.0 & 4 != 0
    }

    /// Whether any derivative data is requested.
    pub fn derivatives(self) -> bool {
        self.0 & 6 != 0
    }

    /// Whether nothing at all is requested.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ActiveSet {
    type Output = ActiveSet;

    fn bitor(self, rhs: ActiveSet) -> ActiveSet {
        ActiveSet(self.0 | rhs.0)
    }
}

impl fmt::Display for ActiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ASV({})", self.0)
    }
}

/// Response data produced by one model evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Function values, one per response function
    pub values: Option<Array1<f64>>,

    /// Gradients laid out as `num_variables x num_functions`; column `f` is the
    /// gradient of response function `f`
    pub gradients: Option<Array2<f64>>,

    /// Hessians, one `num_variables x num_variables` matrix per response function
    pub hessians: Option<Vec<Array2<f64>>>,
}

impl Response {
    /// An empty response.
    pub fn empty() -> Self {
        Self {
            values: None,
            gradients: None,
            hessians: None,
        }
    }

    /// Function values, or an evaluation error if they were not produced.
    pub fn values(&self) -> Result<&Array1<f64>> {
        self.values.as_ref().ok_or_else(|| {
            SubspaceError::FunctionEvaluation("response carries no function values".to_string())
        })
    }

    /// Gradient matrix, or an evaluation error if it was not produced.
    pub fn gradients(&self) -> Result<&Array2<f64>> {
        self.gradients.as_ref().ok_or_else(|| {
            SubspaceError::FunctionEvaluation("response carries no gradients".to_string())
        })
    }

    /// Hessians, or an evaluation error if they were not produced.
    pub fn hessians(&self) -> Result<&[Array2<f64>]> {
        self.hessians.as_deref().ok_or_else(|| {
            SubspaceError::FunctionEvaluation("response carries no Hessians".to_string())
        })
    }

    /// Check the response shape against the expected variable and function counts.
    pub fn check_shape(&self, num_variables: usize, num_functions: usize) -> Result<()> {
        if let Some(values) = &self.values {
            if values.len() != num_functions {
                return Err(SubspaceError::DimensionMismatch(format!(
                    "Expected {} function values, got {}",
                    num_functions,
                    values.len()
                )));
            }
        }
        if let Some(gradients) = &self.gradients {
            if gradients.dim() != (num_variables, num_functions) {
                return Err(SubspaceError::DimensionMismatch(format!(
                    "Expected gradient matrix {}x{}, got {:?}",
                    num_variables,
                    num_functions,
                    gradients.dim()
                )));
            }
        }
        if let Some(hessians) = &self.hessians {
            if hessians.len() != num_functions
                || hessians
                    .iter()
                    .any(|h| h.dim() != (num_variables, num_variables))
            {
                return Err(SubspaceError::DimensionMismatch(format!(
                    "Expected {} Hessians of size {}x{}",
                    num_functions, num_variables, num_variables
                )));
            }
        }
        Ok(())
    }
}

/// A trait representing the expensive simulation being reduced.
///
/// Implementations must be shareable across threads because samplers may
/// evaluate a batch of points concurrently.
pub trait FullSpaceModel: Sync {
    /// Number of continuous input variables.
    fn num_variables(&self) -> usize;

    /// Number of response functions.
    fn num_functions(&self) -> usize;

    /// Evaluate the model at `x`, producing the data requested by `request`.
    ///
    /// # Arguments
    ///
    /// * `x` - The point at which to evaluate, of length `num_variables()`
    /// * `request` - Which of values, gradients and Hessians to compute
    ///
    /// # Returns
    ///
    /// * The response, or an error if the evaluation fails
    fn evaluate(&self, x: &Array1<f64>, request: ActiveSet) -> Result<Response>;

    /// Whether `evaluate` can produce gradients.
    fn supports_gradients(&self) -> bool {
        true
    }

    /// Whether `evaluate` can produce Hessians.
    fn supports_hessians(&self) -> bool {
        false
    }

    /// Number of evaluations that may usefully run at once when derivatives are
    /// requested. Samplers use this as a batching hint only.
    fn derivative_concurrency(&self) -> usize {
        1
    }
}

type ValueFn = dyn Fn(&Array1<f64>) -> Array1<f64> + Send + Sync;
type GradientFn = dyn Fn(&Array1<f64>) -> Array2<f64> + Send + Sync;
type HessianFn = dyn Fn(&Array1<f64>) -> Vec<Array2<f64>> + Send + Sync;

/// Adapter turning plain closures into a `FullSpaceModel`.
pub struct ClosureModel {
    num_variables: usize,
    num_functions: usize,
    values: Box<ValueFn>,
    gradients: Option<Box<GradientFn>>,
    hessians: Option<Box<HessianFn>>,
}

impl ClosureModel {
    /// Create a value-only model.
    pub fn new<F>(num_variables: usize, num_functions: usize, values: F) -> Self
    where
        F: Fn(&Array1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            num_variables,
            num_functions,
            values: Box::new(values),
            gradients: None,
            hessians: None,
        }
    }

    /// Attach an analytic gradient (`num_variables x num_functions`).
    pub fn with_gradients<G>(mut self, gradients: G) -> Self
    where
        G: Fn(&Array1<f64>) -> Array2<f64> + Send + Sync + 'static,
    {
        self.gradients = Some(Box::new(gradients));
        self
    }

    /// Attach analytic Hessians (one per response function).
    pub fn with_hessians<H>(mut self, hessians: H) -> Self
    where
        H: Fn(&Array1<f64>) -> Vec<Array2<f64>> + Send + Sync + 'static,
    {
        self.hessians = Some(Box::new(hessians));
        self
    }
}

impl FullSpaceModel for ClosureModel {
    fn num_variables(&self) -> usize {
        self.num_variables
    }

    fn num_functions(&self) -> usize {
        self.num_functions
    }

    fn evaluate(&self, x: &Array1<f64>, request: ActiveSet) -> Result<Response> {
        if x.len() != self.num_variables {
            return Err(SubspaceError::DimensionMismatch(format!(
                "Expected {} variables, got {}",
                self.num_variables,
                x.len()
            )));
        }

        let mut response = Response::empty();
        if request.values() {
            response.values = Some((self.values)(x));
        }
        if request.gradients() {
            let gradients = self.gradients.as_ref().ok_or_else(|| {
                SubspaceError::FunctionEvaluation("model provides no gradients".to_string())
            })?;
            response.gradients = Some(gradients(x));
        }
        if request.hessians() {
            let hessians = self.hessians.as_ref().ok_or_else(|| {
                SubspaceError::FunctionEvaluation("model provides no Hessians".to_string())
            })?;
            response.hessians = Some(hessians(x));
        }
        response.check_shape(self.num_variables, self.num_functions)?;
        Ok(response)
    }

    fn supports_gradients(&self) -> bool {
        self.gradients.is_some()
    }

    fn supports_hessians(&self) -> bool {
        self.hessians.is_some()
    }
}
