//! # Subspace Rotation Model
//!
//! Partitions an orthogonal basis of the full input space into an active block
//! (the first `rank` columns) and an inactive block, and maps between reduced
//! coordinates `y` and full coordinates `x`:
//!
//! ```text
//! z = A y + I v          (v = I^T z_mean, the frozen inactive value)
//! x = center + scale * z
//! ```
//!
//! For an active subspace the affine pre-map is the identity (`center = 0`,
//! `scale = 1`); for an adapted basis the basis lives in standardized
//! coordinates (`center = mu`, `scale = sd`).
//!
//! Responses travel the other way through the chain rule with
//! `J = diag(scale) A`: `dg/dy = J^T dg/dx` and `H_y = J^T H_x J`.

use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubspaceError};
use crate::model::{ActiveSet, Response};
use crate::variables::UncertainVariables;

/// Coordinates the rotation basis is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateFrame {
    /// The basis acts on the physical variables directly
    Physical,

    /// The basis acts on `(x - mu) / sd`; reduced variables are standard normal
    Standardized,
}

/// Normal distribution of the reduced variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedNormal {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
    /// Row-major `rank x rank` correlation matrix
    pub correlation: Vec<f64>,
}

impl ReducedNormal {
    /// Independent standard normals in `rank` dimensions.
    pub fn standard(rank: usize) -> Self {
        Self {
            means: vec![0.0; rank],
            std_devs: vec![1.0; rank],
            correlation: Array2::<f64>::eye(rank).into_raw_vec(),
        }
    }

    pub fn correlation_matrix(&self) -> Array2<f64> {
        let n = self.means.len();
        Array2::from_shape_fn((n, n), |(i, j)| self.correlation[i * n + j])
    }
}

/// Map full-space normal parameters through `active`:
/// `mu_y = A^T mu_x` and `V_y = A^T V_x A` with
/// `V_x = diag(sd) C diag(sd)` (or `diag(sd^2)` without a correlation matrix).
pub fn distribution_transform(
    active: ArrayView2<'_, f64>,
    means: &Array1<f64>,
    std_devs: &Array1<f64>,
    correlation: Option<&Array2<f64>>,
) -> Result<ReducedNormal> {
    let n = active.nrows();
    if means.len() != n || std_devs.len() != n {
        return Err(SubspaceError::DimensionMismatch(format!(
            "distribution has {} means and {} std devs, basis has {} rows",
            means.len(),
            std_devs.len(),
            n
        )));
    }

    let covariance = match correlation {
        Some(c) => Array2::from_shape_fn((n, n), |(i, j)| std_devs[i] * c[[i, j]] * std_devs[j]),
        None => Array2::from_diag(&std_devs.mapv(|s| s * s)),
    };
    let mu_y = active.t().dot(means);
    let v_y = active.t().dot(&covariance).dot(&active);

    let rank = active.ncols();
    let sd_y: Vec<f64> = (0..rank).map(|i| v_y[[i, i]].max(0.0).sqrt()).collect();
    let mut correlation_y = Vec::with_capacity(rank * rank);
    for i in 0..rank {
        for j in 0..rank {
            let c = if i == j {
                1.0
            } else if sd_y[i] > 0.0 && sd_y[j] > 0.0 {
                v_y[[i, j]] / (sd_y[i] * sd_y[j])
            } else {
                0.0
            };
            correlation_y.push(c);
        }
    }

    Ok(ReducedNormal {
        means: mu_y.to_vec(),
        std_devs: sd_y,
        correlation: correlation_y,
    })
}

/// Reduced-to-full variable map bound to a shared rotation model.
pub type VariableTransform = Box<dyn Fn(ArrayView1<'_, f64>) -> Result<Array1<f64>> + Send + Sync>;

/// Linear change of variables between reduced and full coordinates.
#[derive(Debug, Clone)]
pub struct SubspaceRotationModel {
    rotation: Array2<f64>,
    rank: usize,
    inactive_value: Array1<f64>,
    center: Array1<f64>,
    scale: Array1<f64>,
    frame: CoordinateFrame,
    reduced_distribution: ReducedNormal,
}

impl SubspaceRotationModel {
    /// Bind an orthogonal `rotation` (columns are basis vectors) truncated to
    /// `rank` to the uncertain variables.
    ///
    /// Fails with `UnsupportedDistribution` when a variable is not normal.
    pub fn new(
        rotation: Array2<f64>,
        rank: usize,
        variables: &UncertainVariables,
        frame: CoordinateFrame,
    ) -> Result<Self> {
        let n = variables.num_variables();
        if rotation.dim() != (n, n) {
            return Err(SubspaceError::DimensionMismatch(format!(
                "rotation is {:?}, expected {}x{}",
                rotation.dim(),
                n,
                n
            )));
        }
        if rank == 0 || rank > n {
            return Err(SubspaceError::Configuration(format!(
                "reduced rank must lie in 1..={}, got {}",
                n, rank
            )));
        }
        check_orthogonal(&rotation)?;

        if let Some(m) = variables.marginals().iter().find(|m| !m.is_normal()) {
            return Err(SubspaceError::UnsupportedDistribution(format!(
                "reduced variables need normal marginals, found {}",
                m.family()
            )));
        }

        let means = variables.means();
        let std_devs = variables.std_devs();
        let (center, scale, z_mean, reduced_distribution) = match frame {
            CoordinateFrame::Physical => {
                let reduced = distribution_transform(
                    rotation.slice(s![.., ..rank]),
                    &means,
                    &std_devs,
                    variables.correlation(),
                )?;
                (Array1::zeros(n), Array1::ones(n), means, reduced)
            }
            CoordinateFrame::Standardized => {
                if variables.correlation().is_some() {
                    return Err(SubspaceError::Configuration(
                        "standardized rotations need independent variables".to_string(),
                    ));
                }
                (means, std_devs, Array1::zeros(n), ReducedNormal::standard(rank))
            }
        };

        let inactive_value = rotation.slice(s![.., rank..]).t().dot(&z_mean);
        Ok(Self {
            rotation,
            rank,
            inactive_value,
            center,
            scale,
            frame,
            reduced_distribution,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_full_variables(&self) -> usize {
        self.rotation.nrows()
    }

    pub fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    pub fn active_basis(&self) -> ArrayView2<'_, f64> {
        self.rotation.slice(s![.., ..self.rank])
    }

    pub fn inactive_basis(&self) -> ArrayView2<'_, f64> {
        self.rotation.slice(s![.., self.rank..])
    }

    /// Frozen values of the inactive coordinates.
    pub fn inactive_value(&self) -> &Array1<f64> {
        &self.inactive_value
    }

    /// Normal distribution of the reduced variables.
    pub fn reduced_distribution(&self) -> &ReducedNormal {
        &self.reduced_distribution
    }

    /// Reduced coordinates to full coordinates.
    pub fn forward(&self, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if y.len() != self.rank {
            return Err(SubspaceError::DimensionMismatch(format!(
                "reduced point has {} coordinates, rank is {}",
                y.len(),
                self.rank
            )));
        }
        let z = self.active_basis().dot(&y) + self.inactive_basis().dot(&self.inactive_value);
        Ok(&self.center + &(&self.scale * &z))
    }

    /// Project full coordinates onto the active subspace.
    pub fn to_reduced(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if x.len() != self.num_full_variables() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "full point has {} coordinates, expected {}",
                x.len(),
                self.num_full_variables()
            )));
        }
        let z = (&x - &self.center) / &self.scale;
        Ok(self.active_basis().t().dot(&z))
    }

    /// Project every column of `x`.
    pub fn to_reduced_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let mut y = Array2::zeros((self.rank, x.ncols()));
        for (j, column) in x.columns().into_iter().enumerate() {
            y.column_mut(j).assign(&self.to_reduced(column)?);
        }
        Ok(y)
    }

    // J = diag(scale) A
    fn jacobian(&self) -> Array2<f64> {
        let mut j = self.active_basis().to_owned();
        for (mut row, s) in j.rows_mut().into_iter().zip(self.scale.iter()) {
            row *= *s;
        }
        j
    }

    /// Gradients `num_vars x num_fns` to reduced gradients `rank x num_fns`.
    pub fn transform_gradients(&self, gradients: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if gradients.nrows() != self.num_full_variables() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "gradient has {} rows, expected {}",
                gradients.nrows(),
                self.num_full_variables()
            )));
        }
        Ok(self.jacobian().t().dot(&gradients))
    }

    /// Congruence transform of one full-space Hessian.
    pub fn transform_hessian(&self, hessian: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let n = self.num_full_variables();
        if hessian.dim() != (n, n) {
            return Err(SubspaceError::DimensionMismatch(format!(
                "Hessian is {:?}, expected {}x{}",
                hessian.dim(),
                n,
                n
            )));
        }
        let j = self.jacobian();
        Ok(j.t().dot(&hessian).dot(&j))
    }

    /// Map a full-space response into reduced space. Values pass through.
    pub fn transform_response(&self, response: &Response) -> Result<Response> {
        let gradients = match &response.gradients {
            Some(g) => Some(self.transform_gradients(g.view())?),
            None => None,
        };
        let hessians = match &response.hessians {
            Some(hs) => Some(
                hs.iter()
                    .map(|h| self.transform_hessian(h.view()))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(Response {
            values: response.values.clone(),
            gradients,
            hessians,
        })
    }

    /// Full-space request for a reduced-space request.
    ///
    /// Derivatives are always taken with respect to every full-space variable,
    /// since each reduced coordinate mixes all of them.
    pub fn expand_active_set(&self, request: ActiveSet) -> ActiveSet {
        let mut expanded = ActiveSet::from_bits(request.bits() & ActiveSet::VALUES.bits());
        if request.gradients() {
            expanded = expanded | ActiveSet::GRADIENTS;
        }
        if request.hessians() {
            expanded = expanded | ActiveSet::HESSIANS;
        }
        expanded
    }

    /// Reduced-to-full map as a closure owning a handle to `model`.
    pub fn variable_transform(model: &Arc<Self>) -> VariableTransform {
        let model = Arc::clone(model);
        Box::new(move |y| model.forward(y))
    }
}

fn check_orthogonal(rotation: &Array2<f64>) -> Result<()> {
    let n = rotation.nrows();
    let gram = rotation.t().dot(rotation);
    let tol = 1e-8 * (n.max(1) as f64);
    for ((i, j), v) in gram.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        if (v - expected).abs() > tol {
            return Err(SubspaceError::LinearAlgebra(format!(
                "rotation is not orthogonal: (R^T R)[{}, {}] = {}",
                i, j, v
            )));
        }
    }
    Ok(())
}
