//! # Uncertain Input Variables
//!
//! Marginal distributions of the full-space continuous variables, an optional
//! correlation matrix, and random draws from the joint distribution.
//!
//! Correlated draws follow the usual Cholesky construction: if `C = L L^T` is
//! the correlation matrix and `z ~ N(0, I)`, then `x_i = mu_i + sd_i (L z)_i`
//! has the requested marginals and correlation.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubspaceError};
use crate::linalg::cholesky_lower;

/// Marginal distribution of one continuous variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marginal {
    /// Normal distribution with the given mean and standard deviation
    Normal { mean: f64, std_dev: f64 },

    /// Uniform distribution on `[lower, upper]`
    Uniform { lower: f64, upper: f64 },
}

impl Marginal {
    pub fn normal(mean: f64, std_dev: f64) -> Self {
        Marginal::Normal { mean, std_dev }
    }

    pub fn uniform(lower: f64, upper: f64) -> Self {
        Marginal::Uniform { lower, upper }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Marginal::Normal { mean, .. } => mean,
            Marginal::Uniform { lower, upper } => 0.5 * (lower + upper),
        }
    }

    pub fn std_dev(&self) -> f64 {
        match *self {
            Marginal::Normal { std_dev, .. } => std_dev,
            Marginal::Uniform { lower, upper } => (upper - lower) / 12f64.sqrt(),
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Marginal::Normal { .. })
    }

    /// Short name of the distribution family, used in diagnostics.
    pub fn family(&self) -> &'static str {
        match self {
            Marginal::Normal { .. } => "normal",
            Marginal::Uniform { .. } => "uniform",
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        match *self {
            Marginal::Normal { mean, std_dev } => {
                if !mean.is_finite() || !std_dev.is_finite() || std_dev <= 0.0 {
                    return Err(SubspaceError::Configuration(format!(
                        "variable {}: normal needs a finite mean and positive std_dev, got ({}, {})",
                        index, mean, std_dev
                    )));
                }
            }
            Marginal::Uniform { lower, upper } => {
                if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                    return Err(SubspaceError::Configuration(format!(
                        "variable {}: uniform needs finite bounds with lower < upper, got [{}, {}]",
                        index, lower, upper
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The uncertain continuous variables of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainVariables {
    marginals: Vec<Marginal>,
    correlation: Option<Array2<f64>>,
}

impl UncertainVariables {
    /// Independent variables with the given marginals.
    pub fn new(marginals: Vec<Marginal>) -> Result<Self> {
        if marginals.is_empty() {
            return Err(SubspaceError::Configuration(
                "at least one uncertain variable is required".to_string(),
            ));
        }
        for (i, m) in marginals.iter().enumerate() {
            m.validate(i)?;
        }
        Ok(Self {
            marginals,
            correlation: None,
        })
    }

    /// Independent normal variables.
    pub fn independent_normals(means: &[f64], std_devs: &[f64]) -> Result<Self> {
        if means.len() != std_devs.len() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "{} means but {} standard deviations",
                means.len(),
                std_devs.len()
            )));
        }
        Self::new(
            means
                .iter()
                .zip(std_devs)
                .map(|(&m, &s)| Marginal::normal(m, s))
                .collect(),
        )
    }

    /// Standard normal variables `N(0, 1)`.
    pub fn standard_normals(num_variables: usize) -> Result<Self> {
        Self::new(vec![Marginal::normal(0.0, 1.0); num_variables])
    }

    /// Attach a correlation matrix. Only normal variables may be correlated.
    pub fn with_correlation(mut self, correlation: Array2<f64>) -> Result<Self> {
        let n = self.marginals.len();
        if correlation.dim() != (n, n) {
            return Err(SubspaceError::DimensionMismatch(format!(
                "correlation matrix is {:?}, expected {}x{}",
                correlation.dim(),
                n,
                n
            )));
        }
        for i in 0..n {
            if (correlation[[i, i]] - 1.0).abs() > 1e-12 {
                return Err(SubspaceError::Configuration(format!(
                    "correlation matrix diagonal entry {} is {}, expected 1",
                    i,
                    correlation[[i, i]]
                )));
            }
            for j in 0..i {
                if (correlation[[i, j]] - correlation[[j, i]]).abs() > 1e-12 {
                    return Err(SubspaceError::Configuration(
                        "correlation matrix is not symmetric".to_string(),
                    ));
                }
                if correlation[[i, j]] != 0.0
                    && !(self.marginals[i].is_normal() && self.marginals[j].is_normal())
                {
                    return Err(SubspaceError::UnsupportedDistribution(format!(
                        "variables {} and {} are correlated but not both normal",
                        j, i
                    )));
                }
            }
        }
        cholesky_lower(correlation.view())?;
        self.correlation = Some(correlation);
        Ok(self)
    }

    pub fn num_variables(&self) -> usize {
        self.marginals.len()
    }

    pub fn marginals(&self) -> &[Marginal] {
        &self.marginals
    }

    pub fn correlation(&self) -> Option<&Array2<f64>> {
        self.correlation.as_ref()
    }

    pub fn means(&self) -> Array1<f64> {
        self.marginals.iter().map(Marginal::mean).collect()
    }

    pub fn std_devs(&self) -> Array1<f64> {
        self.marginals.iter().map(Marginal::std_dev).collect()
    }

    /// Covariance matrix `diag(sd) C diag(sd)`, or `diag(sd^2)` when uncorrelated.
    pub fn covariance(&self) -> Array2<f64> {
        let sd = self.std_devs();
        let n = sd.len();
        match &self.correlation {
            Some(c) => Array2::from_shape_fn((n, n), |(i, j)| sd[i] * c[[i, j]] * sd[j]),
            None => Array2::from_diag(&sd.mapv(|s| s * s)),
        }
    }

    /// Draw `num_samples` points, one per column (`num_variables x num_samples`).
    pub fn sample_matrix(&self, num_samples: usize, rng: &mut impl Rng) -> Result<Array2<f64>> {
        let n = self.num_variables();
        let chol = match &self.correlation {
            Some(c) => Some(cholesky_lower(c.view())?),
            None => None,
        };

        let mut samples = Array2::zeros((n, num_samples));
        for s in 0..num_samples {
            // Generate vector of standard normal random values
            let z: Vec<f64> = (0..n).map(|_| StandardNormal.sample(rng)).collect();

            for (j, marginal) in self.marginals.iter().enumerate() {
                samples[[j, s]] = match *marginal {
                    Marginal::Normal { mean, std_dev } => {
                        let zj = match &chol {
                            Some(l) => (0..=j).map(|i| l[[j, i]] * z[i]).sum::<f64>(),
                            None => z[j],
                        };
                        mean + std_dev * zj
                    }
                    Marginal::Uniform { lower, upper } => {
                        Uniform::new_inclusive(lower, upper).sample(rng)
                    }
                };
            }
        }
        Ok(samples)
    }
}
