//! # Design and Analysis of Computer Experiments Samplers
//!
//! A sampler chooses points in the full input space and drives the full-space
//! model at them, returning a complete batch of `(variables, response)` pairs.
//! The subspace core treats one `run` as an opaque blocking call; any
//! parallelism lives here.

use std::collections::BTreeMap;

use log::debug;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SubspaceError};
use crate::model::{ActiveSet, FullSpaceModel, Response};
use crate::utils::evaluate_batch;
use crate::variables::UncertainVariables;

/// One batch of sampled points and their responses.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// Sample points, one per column (`num_variables x num_samples`)
    pub samples: Array2<f64>,

    /// Responses keyed by sample (column) index
    pub responses: BTreeMap<usize, Response>,
}

impl SampleBatch {
    /// Number of sampled points.
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.ncols() == 0
    }
}

/// Interface of a design-of-experiments sampler.
pub trait DaceSampler {
    /// Set the batch size, seed and random generator for subsequent runs.
    ///
    /// Reconfiguring with the same seed and generator keeps the current random
    /// stream, so successive batches draw fresh points.
    fn configure(&mut self, num_samples: usize, seed: Option<u64>, rng_name: &str) -> Result<()>;

    /// Draw a batch of points and evaluate `model` at each with `request`.
    fn run(&mut self, model: &dyn FullSpaceModel, request: ActiveSet) -> Result<SampleBatch>;

    /// Number of continuous variables the sampler draws.
    fn num_variables(&self) -> usize;
}

/// Create the random generator named `rng_name`.
pub fn make_rng(rng_name: &str, seed: Option<u64>) -> Result<Box<dyn RngCore + Send>> {
    let rng: Box<dyn RngCore + Send> = match (rng_name, seed) {
        ("chacha8", Some(s)) => Box::new(ChaCha8Rng::seed_from_u64(s)),
        ("chacha8", None) => Box::new(ChaCha8Rng::from_entropy()),
        ("std", Some(s)) => Box::new(StdRng::seed_from_u64(s)),
        ("std", None) => Box::new(StdRng::from_entropy()),
        (other, _) => {
            return Err(SubspaceError::Configuration(format!(
                "unknown random generator '{}', expected 'chacha8' or 'std'",
                other
            )))
        }
    };
    Ok(rng)
}

/// Monte Carlo sampler drawing from the joint distribution of the uncertain
/// variables.
pub struct MonteCarloSampler {
    variables: UncertainVariables,
    num_samples: usize,
    seed: Option<u64>,
    rng_name: String,
    rng: Box<dyn RngCore + Send>,
}

impl MonteCarloSampler {
    /// Create a sampler with `num_samples` points per batch.
    pub fn new(variables: UncertainVariables, num_samples: usize, seed: Option<u64>) -> Result<Self> {
        let rng = make_rng("chacha8", seed)?;
        Ok(Self {
            variables,
            num_samples,
            seed,
            rng_name: "chacha8".to_string(),
            rng,
        })
    }

    pub fn variables(&self) -> &UncertainVariables {
        &self.variables
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }
}

impl DaceSampler for MonteCarloSampler {
    fn configure(&mut self, num_samples: usize, seed: Option<u64>, rng_name: &str) -> Result<()> {
        if seed != self.seed || rng_name != self.rng_name {
            self.rng = make_rng(rng_name, seed)?;
            self.seed = seed;
            self.rng_name = rng_name.to_string();
        }
        self.num_samples = num_samples;
        Ok(())
    }

    fn run(&mut self, model: &dyn FullSpaceModel, request: ActiveSet) -> Result<SampleBatch> {
        if model.num_variables() != self.variables.num_variables() {
            return Err(SubspaceError::DimensionMismatch(format!(
                "sampler draws {} variables but the model takes {}",
                self.variables.num_variables(),
                model.num_variables()
            )));
        }

        let samples = self.variables.sample_matrix(self.num_samples, &mut self.rng)?;
        debug!(
            "Monte Carlo sampler evaluating {} points (ASV {}, derivative concurrency {})",
            self.num_samples,
            request,
            model.derivative_concurrency()
        );
        let responses = evaluate_batch(model, &samples, request)?;

        Ok(SampleBatch {
            samples,
            responses: responses.into_iter().enumerate().collect(),
        })
    }

    fn num_variables(&self) -> usize {
        self.variables.num_variables()
    }
}
