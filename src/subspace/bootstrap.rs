//! # Block Bootstrap Resampling
//!
//! Resamples the columns of a derivative matrix with replacement at the
//! granularity of whole sample-point blocks (`num_functions` columns each), so
//! the gradients of different responses at one point always travel together.
//!
//! The random stream lives in an explicit `BootstrapRngState` that a build
//! seeds once and threads through every bootstrap criterion, instead of a
//! process-wide generator. It runs on its own ChaCha stream, so a build that
//! seeds its sampler with the same value never resamples with the words that
//! placed the sample points.

use ndarray::{s, Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SubspaceError};

/// ChaCha stream reserved for bootstrap resampling; samplers use stream 0.
const BOOTSTRAP_STREAM: u64 = 1;

/// Random state shared by the bootstrap criteria of one build.
#[derive(Debug, Clone)]
pub struct BootstrapRngState {
    rng: ChaCha8Rng,
}

impl BootstrapRngState {
    /// Seed the stream; `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        rng.set_stream(BOOTSTRAP_STREAM);
        Self { rng }
    }

    /// Uniform draw from `[0, upper)`.
    pub fn draw_index(&mut self, upper: usize) -> usize {
        self.rng.gen_range(0..upper)
    }

    /// Shuffle `items` in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

/// Block resampler bound to one source matrix.
#[derive(Debug, Clone)]
pub struct BootstrapSampler<'a> {
    source: ArrayView2<'a, f64>,
    block_size: usize,
    num_blocks: usize,
    output_blocks: usize,
}

impl<'a> BootstrapSampler<'a> {
    /// Create an n-out-of-n resampler over `source`, whose columns form
    /// consecutive blocks of `block_size`.
    pub fn new(source: ArrayView2<'a, f64>, block_size: usize) -> Result<Self> {
        if block_size == 0 || source.ncols() % block_size != 0 {
            return Err(SubspaceError::DimensionMismatch(format!(
                "{} columns do not split into blocks of {}",
                source.ncols(),
                block_size
            )));
        }
        let num_blocks = source.ncols() / block_size;
        if num_blocks == 0 {
            return Err(SubspaceError::InsufficientData(
                "bootstrap source matrix has no sample blocks".to_string(),
            ));
        }
        Ok(Self {
            source,
            block_size,
            num_blocks,
            output_blocks: num_blocks,
        })
    }

    /// Switch to m-out-of-n resampling with `m` output blocks.
    pub fn with_output_blocks(mut self, m: usize) -> Result<Self> {
        if m == 0 {
            return Err(SubspaceError::Configuration(
                "m-out-of-n bootstrap needs m >= 1".to_string(),
            ));
        }
        self.output_blocks = m;
        Ok(self)
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Shape of a replicate.
    pub fn output_dim(&self) -> (usize, usize) {
        (self.source.nrows(), self.output_blocks * self.block_size)
    }

    /// Draw the source block index for every output block.
    pub fn draw_indices(&self, rng: &mut BootstrapRngState) -> Vec<usize> {
        (0..self.output_blocks)
            .map(|_| rng.draw_index(self.num_blocks))
            .collect()
    }

    /// Fill `out` by copying source block `indices[k]` into output block `k`.
    pub fn resample_with(&self, indices: &[usize], out: &mut Array2<f64>) -> Result<()> {
        if out.dim() != self.output_dim() || indices.len() != self.output_blocks {
            return Err(SubspaceError::DimensionMismatch(format!(
                "bootstrap replicate is {:?} with {} indices, expected {:?} with {}",
                out.dim(),
                indices.len(),
                self.output_dim(),
                self.output_blocks
            )));
        }
        let b = self.block_size;
        for (k, &src) in indices.iter().enumerate() {
            out.slice_mut(s![.., k * b..(k + 1) * b])
                .assign(&self.source.slice(s![.., src * b..(src + 1) * b]));
        }
        Ok(())
    }

    /// Draw a fresh replicate into `out`.
    pub fn resample(&self, rng: &mut BootstrapRngState, out: &mut Array2<f64>) -> Result<()> {
        let indices = self.draw_indices(rng);
        self.resample_with(&indices, out)
    }

    /// Draw a fresh replicate into a new matrix.
    pub fn replicate(&self, rng: &mut BootstrapRngState) -> Result<Array2<f64>> {
        let mut out = Array2::zeros(self.output_dim());
        self.resample(rng, &mut out)?;
        Ok(out)
    }
}
