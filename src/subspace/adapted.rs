//! # Adapted Basis Construction
//!
//! Builds a full rotation of the standardized input space from a linear
//! polynomial chaos fit of every response function, instead of from sampled
//! gradients:
//!
//! 1. draw standard normal points `xi`, evaluate the model at `x = mu + sd * xi`
//!    and fit `f_k(xi) ~ c_k0 + c_k . xi` by least squares;
//! 2. for each response, complete `c_k / |c_k|` to an orthonormal block with
//!    the coordinate directions (most sensitive first), via QR;
//! 3. interleave the rows of all blocks and orthonormalize them in order until
//!    the space is spanned;
//! 4. truncate at the smallest size whose weighted reconstruction gap has shrunk
//!    by more than `truncation_threshold` relative to no rotation at all.
//!
//! Reduced variables of an adapted basis are independent standard normals.

use log::{debug, info, warn};
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Result, SubspaceError};
use crate::linalg::{least_squares, orthonormalize_rows, qr_orthonormal_columns};
use crate::model::{ActiveSet, FullSpaceModel};
use crate::sampling::make_rng;
use crate::utils::evaluate_batch;
use crate::variables::UncertainVariables;

use super::config::SubspaceConfig;
use super::constructor::{BasisConstructor, ConstructedBasis, TrainingData};
use super::report::BuildStatistics;
use super::rotation::CoordinateFrame;

const MIN_TRUNCATION_SAMPLES: usize = 200;
const ROW_DEPENDENCE_TOL: f64 = 1e-10;

/// Linear PCE coefficients `d x m` (constant terms dropped) of `values`
/// (`m x n`) over standard normal points `xi` (`d x n`).
pub fn linear_pce_coefficients(
    xi: ArrayView2<'_, f64>,
    values: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    let (d, n) = xi.dim();
    if values.ncols() != n {
        return Err(SubspaceError::DimensionMismatch(format!(
            "{} points but {} response columns",
            n,
            values.ncols()
        )));
    }
    if n < d + 1 {
        return Err(SubspaceError::InsufficientData(format!(
            "a linear fit in {} variables needs at least {} samples, got {}",
            d,
            d + 1,
            n
        )));
    }

    let design = hstack(Array2::<f64>::ones((n, 1)).view(), xi.t())?;
    let solution = least_squares(design.view(), values.t())?;
    Ok(solution.slice(s![1.., ..]).to_owned())
}

fn hstack<'a>(left: ArrayView2<'a, f64>, right: ArrayView2<'a, f64>) -> Result<Array2<f64>> {
    concatenate(Axis(1), &[left, right])
        .map_err(|e| SubspaceError::DimensionMismatch(format!("cannot join sample columns: {}", e)))
}

/// Orthonormal `d x d` block (rows) whose first row is `c / |c|`.
///
/// The remaining rows complete the basis from the coordinate directions other
/// than the dominant one, ordered by decreasing `|c_j|` when
/// `sensitivity_ranked`. A zero `c` gives the identity.
pub fn response_block(c: ArrayView1<'_, f64>, sensitivity_ranked: bool) -> Result<Array2<f64>> {
    let d = c.len();
    let norm = c.dot(&c).sqrt();
    if norm == 0.0 {
        return Ok(Array2::eye(d));
    }

    let dominant = (0..d)
        .max_by(|&a, &b| {
            c[a].abs()
                .partial_cmp(&c[b].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    let mut completion: Vec<usize> = (0..d).filter(|&j| j != dominant).collect();
    if sensitivity_ranked {
        completion.sort_by(|&a, &b| {
            c[b].abs()
                .partial_cmp(&c[a].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    // candidate basis vectors as columns
    let mut candidates = Array2::zeros((d, d));
    candidates.column_mut(0).assign(&(&c / norm));
    for (col, &j) in completion.iter().enumerate() {
        candidates[[j, col + 1]] = 1.0;
    }
    let q = qr_orthonormal_columns(candidates.view())?;
    Ok(q.t().to_owned())
}

/// Full rotation (basis vectors as columns) from the coefficients of every
/// response, `coefficients` being `d x m`.
pub fn assemble_rotation(coefficients: ArrayView2<'_, f64>, sensitivity_ranked: bool) -> Result<Array2<f64>> {
    let (d, m) = coefficients.dim();
    let blocks = coefficients
        .columns()
        .into_iter()
        .map(|c| response_block(c, sensitivity_ranked))
        .collect::<Result<Vec<_>>>()?;

    let mut stacked = Array2::zeros((m * d, d));
    for i in 0..d {
        for (k, block) in blocks.iter().enumerate() {
            stacked.row_mut(i * m + k).assign(&block.row(i));
        }
    }

    let rows = orthonormalize_rows(stacked.view(), ROW_DEPENDENCE_TOL, d);
    if rows.nrows() < d {
        return Err(SubspaceError::LinearAlgebra(format!(
            "adapted basis spans only {} of {} dimensions",
            rows.nrows(),
            d
        )));
    }
    Ok(rows.t().to_owned())
}

/// Cumulative gap reduction for truncation sizes `1..=d`.
///
/// The gap of size `r` is the root mean square over `xi` (`d x N`) of
/// `sum_k (c_k . (xi - P_r xi))^2 / |c_k|^2`, where `P_r` projects onto the
/// first `r` basis vectors; the ratio is `(gap(0) - gap(r)) / gap(0)`.
pub fn truncation_ratios(
    rotation: ArrayView2<'_, f64>,
    coefficients: ArrayView2<'_, f64>,
    xi: ArrayView2<'_, f64>,
) -> Vec<f64> {
    let d = rotation.ncols();
    let weights: Array1<f64> = coefficients.map_axis(Axis(0), |c| {
        let n2 = c.dot(&c);
        if n2 > 0.0 {
            1.0 / n2
        } else {
            0.0
        }
    });

    let coords = rotation.t().dot(&xi);
    let projected_coeffs = rotation.t().dot(&coefficients);
    let full = coefficients.t().dot(&xi);
    let num_samples = xi.ncols().max(1) as f64;

    let gap = |r: usize| -> f64 {
        let residual = &full
            - &projected_coeffs
                .slice(s![..r, ..])
                .t()
                .dot(&coords.slice(s![..r, ..]));
        let total: f64 = residual
            .rows()
            .into_iter()
            .zip(weights.iter())
            .map(|(row, w)| w * row.dot(&row))
            .sum();
        (total / num_samples).sqrt()
    };

    let base = gap(0);
    if base <= 0.0 {
        return vec![0.0; d];
    }
    (1..=d).map(|r| (base - gap(r)) / base).collect()
}

/// Smallest size whose ratio exceeds `threshold`, or the full dimension.
pub fn select_truncation(ratios: &[f64], threshold: f64) -> usize {
    ratios
        .iter()
        .position(|&r| r > threshold)
        .map(|i| i + 1)
        .unwrap_or(ratios.len())
}

/// Adapted basis constructor.
#[derive(Default)]
pub struct AdaptedBasisConstructor {
    rng: Option<Box<dyn RngCore + Send>>,
    samples: Option<Array2<f64>>,
    values: Option<Array2<f64>>,
    coefficients: Option<Array2<f64>>,
}

impl AdaptedBasisConstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Linear PCE coefficients of the last build, `d x m`.
    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    fn standard_normals(&mut self, config: &SubspaceConfig, d: usize, n: usize) -> Result<Array2<f64>> {
        if self.rng.is_none() {
            self.rng = Some(make_rng(&config.rng_name, config.seed)?);
        }
        let rng = self
            .rng
            .as_mut()
            .ok_or_else(|| SubspaceError::Uninitialized("adapted basis generator".to_string()))?;
        Ok(Array2::from_shape_simple_fn((d, n), || StandardNormal.sample(&mut *rng)))
    }

    // Evaluate values at x = mu + sd * xi; returns (x, values).
    fn evaluate_standardized(
        model: &dyn FullSpaceModel,
        variables: &UncertainVariables,
        xi: &Array2<f64>,
    ) -> Result<TrainingData> {
        let means = variables.means().insert_axis(Axis(1));
        let std_devs = variables.std_devs().insert_axis(Axis(1));
        let x = &(xi * &std_devs) + &means;

        let responses = evaluate_batch(model, &x, ActiveSet::VALUES)?;
        let mut values = Array2::zeros((model.num_functions(), x.ncols()));
        for (j, response) in responses.iter().enumerate() {
            let v = response.values()?;
            if v.len() != model.num_functions() {
                return Err(SubspaceError::FunctionEvaluation(format!(
                    "model returned {} values, expected {}",
                    v.len(),
                    model.num_functions()
                )));
            }
            values.column_mut(j).assign(v);
        }
        Ok((x, values))
    }

    fn check_variables(variables: &UncertainVariables) -> Result<()> {
        if let Some(m) = variables.marginals().iter().find(|m| !m.is_normal()) {
            return Err(SubspaceError::UnsupportedDistribution(format!(
                "adapted basis needs normal variables, found {}",
                m.family()
            )));
        }
        if variables.correlation().is_some() {
            return Err(SubspaceError::Configuration(
                "adapted basis needs independent variables".to_string(),
            ));
        }
        Ok(())
    }
}

impl BasisConstructor for AdaptedBasisConstructor {
    fn method(&self) -> &'static str {
        "adapted_basis"
    }

    fn construct(
        &mut self,
        model: &dyn FullSpaceModel,
        variables: &UncertainVariables,
        config: &SubspaceConfig,
    ) -> Result<ConstructedBasis> {
        Self::check_variables(variables)?;
        let d = variables.num_variables();
        config.check_rank_domain(d)?;
        if model.num_variables() != d {
            return Err(SubspaceError::DimensionMismatch(format!(
                "model takes {} variables, {} are uncertain",
                model.num_variables(),
                d
            )));
        }
        self.rng = Some(make_rng(&config.rng_name, config.seed)?);

        let xi = self.standard_normals(config, d, config.initial_samples)?;
        let (x, values) = Self::evaluate_standardized(model, variables, &xi)?;
        let coefficients = linear_pce_coefficients(xi.view(), values.view())?;
        debug!("Linear PCE coefficients:\n{}", coefficients);

        let rotation = assemble_rotation(coefficients.view(), config.sensitivity_ranked)?;

        let truncation_samples = MIN_TRUNCATION_SAMPLES.max(2 * d + 1);
        let probe = self.standard_normals(config, d, truncation_samples)?;
        let ratios = truncation_ratios(rotation.view(), coefficients.view(), probe.view());
        debug!("Adapted basis truncation ratios: {:?}", ratios);

        let rank = match config.user_rank {
            Some(r) => r,
            None => {
                if ratios.iter().all(|&r| r == 0.0) {
                    warn!("Linear fit found no sensitivity; keeping one adapted direction");
                    1
                } else {
                    select_truncation(&ratios, config.truncation_threshold)
                }
            }
        };
        info!("Adapted basis rank {} of {}", rank, d);

        let mut statistics = BuildStatistics::new(self.method(), d, model.num_functions());
        statistics.rank = rank;
        statistics.total_samples = x.ncols();
        statistics.truncation_ratios = ratios;

        self.samples = Some(x);
        self.values = Some(values);
        self.coefficients = Some(coefficients);

        Ok(ConstructedBasis {
            rotation,
            rank,
            frame: CoordinateFrame::Standardized,
            statistics,
        })
    }

    fn training_data(&self) -> Option<TrainingData> {
        match (&self.samples, &self.values) {
            (Some(x), Some(v)) => Some((x.clone(), v.clone())),
            _ => None,
        }
    }

    fn draw_additional(
        &mut self,
        model: &dyn FullSpaceModel,
        variables: &UncertainVariables,
        config: &SubspaceConfig,
        num_samples: usize,
    ) -> Result<usize> {
        let xi = self.standard_normals(config, variables.num_variables(), num_samples)?;
        let (x, values) = Self::evaluate_standardized(model, variables, &xi)?;
        let (samples, all_values) = match (self.samples.take(), self.values.take()) {
            (Some(s), Some(v)) => (hstack(s.view(), x.view())?, hstack(v.view(), values.view())?),
            _ => (x, values),
        };
        self.samples = Some(samples);
        self.values = Some(all_values);
        Ok(num_samples)
    }
}
