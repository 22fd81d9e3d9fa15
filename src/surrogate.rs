//! # Surrogate Models
//!
//! Cheap stand-ins for the full-space model over reduced coordinates. The
//! cross-validation rank criterion fits one per fold and candidate rank, and a
//! build may finish with one over the final active coordinates.
//!
//! The provided implementation is a quadratic moving least squares (MLS)
//! surrogate: every prediction solves its own weighted least-squares fit of a
//! full quadratic polynomial, with Gaussian weights centred on the prediction
//! point.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Result, SubspaceError};
use crate::linalg::least_squares;

/// Interface of a surrogate-fitting collaborator.
///
/// Training points are columns of `x` (`num_dims x num_points`); responses are
/// columns of `y` (`num_functions x num_points`).
pub trait SurrogateFitter {
    /// Add training data.
    fn append_training_data(&mut self, x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<()>;

    /// Finish fitting after the last `append_training_data`.
    fn build(&mut self) -> Result<()>;

    /// Predict all response functions at `x`.
    fn evaluate(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>>;

    /// Minimum number of training points for a `num_dims`-dimensional fit.
    fn required_points(&self, num_dims: usize) -> usize;

    /// Number of training points currently held.
    fn num_points(&self) -> usize;
}

/// Number of terms in a full quadratic polynomial in `num_dims` variables,
/// `C(num_dims + 2, 2)`.
pub fn quadratic_terms(num_dims: usize) -> usize {
    (num_dims + 1) * (num_dims + 2) / 2
}

/// Full quadratic monomial basis `1, x_i, x_i x_j (i <= j)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadraticBasis {
    num_dims: usize,
}

impl QuadraticBasis {
    pub fn new(num_dims: usize) -> Self {
        Self { num_dims }
    }

    pub fn num_terms(&self) -> usize {
        quadratic_terms(self.num_dims)
    }

    /// Evaluate every basis term at `x`.
    pub fn evaluate(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut terms = Vec::with_capacity(self.num_terms());
        terms.push(1.0);
        terms.extend(x.iter().copied());
        for i in 0..self.num_dims {
            for j in i..self.num_dims {
                terms.push(x[i] * x[j]);
            }
        }
        Array1::from(terms)
    }
}

/// Quadratic moving least squares surrogate.
#[derive(Debug, Clone)]
pub struct MovingLeastSquares {
    num_dims: usize,
    num_functions: usize,
    x: Vec<Array1<f64>>,
    y: Vec<Array1<f64>>,
    built: bool,
}

impl MovingLeastSquares {
    /// Create an empty surrogate over `num_dims` inputs and `num_functions` outputs.
    pub fn new(num_dims: usize, num_functions: usize) -> Self {
        Self {
            num_dims,
            num_functions,
            x: Vec::new(),
            y: Vec::new(),
            built: false,
        }
    }

    fn basis(&self) -> QuadraticBasis {
        QuadraticBasis::new(self.num_dims)
    }

    // Bandwidth: distance to the k-th nearest training point, k = 2 * terms.
    fn bandwidth(&self, distances: &[f64]) -> f64 {
        let mut sorted = distances.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let k = (2 * self.basis().num_terms()).min(sorted.len()) - 1;
        let h = sorted[k];
        if h > 0.0 {
            h
        } else {
            sorted.last().copied().filter(|&d| d > 0.0).unwrap_or(1.0)
        }
    }
}

impl SurrogateFitter for MovingLeastSquares {
    fn append_training_data(&mut self, x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>) -> Result<()> {
        if x.nrows() != self.num_dims || y.nrows() != self.num_functions || x.ncols() != y.ncols() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "MLS training data: expected {}xN inputs and {}xN outputs, got {:?} and {:?}",
                self.num_dims,
                self.num_functions,
                x.dim(),
                y.dim()
            )));
        }
        self.x.extend(x.columns().into_iter().map(|c| c.to_owned()));
        self.y.extend(y.columns().into_iter().map(|c| c.to_owned()));
        self.built = false;
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let required = self.required_points(self.num_dims);
        if self.x.len() < required {
            return Err(SubspaceError::InsufficientData(format!(
                "quadratic MLS in {} dimensions needs {} points, has {}",
                self.num_dims,
                required,
                self.x.len()
            )));
        }
        self.built = true;
        Ok(())
    }

    fn evaluate(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if !self.built {
            return Err(SubspaceError::Uninitialized(
                "MLS surrogate evaluated before build".to_string(),
            ));
        }
        if x.len() != self.num_dims {
            return Err(SubspaceError::DimensionMismatch(format!(
                "MLS surrogate takes {} inputs, got {}",
                self.num_dims,
                x.len()
            )));
        }

        let basis = self.basis();
        let n = self.x.len();
        let distances: Vec<f64> = self
            .x
            .iter()
            .map(|xi| {
                xi.iter()
                    .zip(x.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();
        let h = self.bandwidth(&distances);

        let mut a = Array2::zeros((n, basis.num_terms()));
        let mut b = Array2::zeros((n, self.num_functions));
        for i in 0..n {
            let w = (-(distances[i] / h).powi(2)).exp().sqrt();
            a.row_mut(i).assign(&(basis.evaluate(self.x[i].view()) * w));
            b.row_mut(i).assign(&(&self.y[i] * w));
        }

        let coeffs = least_squares(a.view(), b.view())?;
        Ok(coeffs.t().dot(&basis.evaluate(x)))
    }

    fn required_points(&self, num_dims: usize) -> usize {
        quadratic_terms(num_dims)
    }

    fn num_points(&self) -> usize {
        self.x.len()
    }
}
