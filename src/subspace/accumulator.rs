//! # Derivative Sample Accumulation
//!
//! Sampled gradients are stacked into a growing derivative matrix with one
//! block of `num_functions` columns per sample point; the sample points go into
//! a parallel variables matrix with one column each. Both live in append-only
//! arenas whose valid-column cursor only moves forward by whole blocks, until
//! an explicit `clear` starts a fresh build.

use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Result, SubspaceError};
use crate::model::{ActiveSet, FullSpaceModel, Response};
use crate::sampling::{DaceSampler, SampleBatch};

use super::config::Normalization;

/// Column storage with a fixed block width and a valid-column cursor.
#[derive(Debug, Clone)]
struct BlockArena {
    storage: Array2<f64>,
    block_width: usize,
    num_blocks: usize,
}

impl BlockArena {
    fn new(num_rows: usize, block_width: usize) -> Self {
        Self {
            storage: Array2::zeros((num_rows, 0)),
            block_width,
            num_blocks: 0,
        }
    }

    fn valid_columns(&self) -> usize {
        self.num_blocks * self.block_width
    }

    fn reserve_blocks(&mut self, additional: usize) {
        let needed = (self.num_blocks + additional) * self.block_width;
        if needed <= self.storage.ncols() {
            return;
        }
        let capacity = needed.max(2 * self.storage.ncols());
        let mut grown = Array2::zeros((self.storage.nrows(), capacity));
        let used = self.valid_columns();
        grown
            .slice_mut(s![.., ..used])
            .assign(&self.storage.slice(s![.., ..used]));
        self.storage = grown;
    }

    fn push_block(&mut self, block: ArrayView2<'_, f64>) -> Result<()> {
        if block.dim() != (self.storage.nrows(), self.block_width) {
            return Err(SubspaceError::DimensionMismatch(format!(
                "block is {:?}, expected {}x{}",
                block.dim(),
                self.storage.nrows(),
                self.block_width
            )));
        }
        self.reserve_blocks(1);
        let start = self.valid_columns();
        self.storage
            .slice_mut(s![.., start..start + self.block_width])
            .assign(&block);
        self.num_blocks += 1;
        Ok(())
    }

    fn view(&self) -> ArrayView2<'_, f64> {
        self.storage.slice(s![.., ..self.valid_columns()])
    }

    fn clear(&mut self) {
        self.num_blocks = 0;
    }
}

/// Stacked gradients: `num_variables x (num_samples * num_functions)`, one
/// block of `num_functions` contiguous columns per sample point.
#[derive(Debug, Clone)]
pub struct DerivativeMatrix {
    arena: BlockArena,
}

impl DerivativeMatrix {
    pub fn new(num_variables: usize, num_functions: usize) -> Self {
        Self {
            arena: BlockArena::new(num_variables, num_functions),
        }
    }

    /// Append the (already scaled) gradient block of one sample point.
    pub fn append_block(&mut self, block: ArrayView2<'_, f64>) -> Result<()> {
        self.arena.push_block(block)
    }

    /// Reserve room for `additional` more sample blocks.
    pub fn reserve(&mut self, additional: usize) {
        self.arena.reserve_blocks(additional);
    }

    /// The valid columns.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.arena.view()
    }

    pub fn num_variables(&self) -> usize {
        self.arena.storage.nrows()
    }

    pub fn num_functions(&self) -> usize {
        self.arena.block_width
    }

    pub fn num_samples(&self) -> usize {
        self.arena.num_blocks
    }

    pub fn num_columns(&self) -> usize {
        self.arena.valid_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.num_blocks == 0
    }

    /// Drop all blocks; only used when a build starts over.
    pub fn clear(&mut self) {
        self.arena.clear();
    }
}

/// Sample points: `num_variables x num_samples`, in derivative-block order.
#[derive(Debug, Clone)]
pub struct VariablesMatrix {
    arena: BlockArena,
}

impl VariablesMatrix {
    pub fn new(num_variables: usize) -> Self {
        Self {
            arena: BlockArena::new(num_variables, 1),
        }
    }

    pub fn append_column(&mut self, x: ArrayView1<'_, f64>) -> Result<()> {
        self.arena.push_block(x.insert_axis(ndarray::Axis(1)))
    }

    pub fn reserve(&mut self, additional: usize) {
        self.arena.reserve_blocks(additional);
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.arena.view()
    }

    pub fn num_samples(&self) -> usize {
        self.arena.num_blocks
    }

    pub fn clear(&mut self) {
        self.arena.clear();
    }
}

/// Drives a sampler against the full-space model and grows the derivative,
/// variables and (optionally) function-value matrices.
pub struct DerivativeSampleAccumulator<S: DaceSampler> {
    sampler: S,
    num_variables: usize,
    num_functions: usize,
    normalization: Normalization,
    seed: Option<u64>,
    rng_name: String,
    collect_values: bool,
    derivatives: DerivativeMatrix,
    variables: VariablesMatrix,
    values: BlockArena,
    gradient_scale_factors: Array1<f64>,
}

impl<S: DaceSampler> DerivativeSampleAccumulator<S> {
    /// Create an accumulator for a model with `num_functions` responses.
    pub fn new(
        sampler: S,
        num_functions: usize,
        normalization: Normalization,
        seed: Option<u64>,
        rng_name: &str,
    ) -> Self {
        let num_variables = sampler.num_variables();
        Self {
            sampler,
            num_variables,
            num_functions,
            normalization,
            seed,
            rng_name: rng_name.to_string(),
            collect_values: false,
            derivatives: DerivativeMatrix::new(num_variables, num_functions),
            variables: VariablesMatrix::new(num_variables),
            values: BlockArena::new(num_functions, 1),
            gradient_scale_factors: Array1::ones(num_functions),
        }
    }

    /// Always request and keep function values, even for a single response.
    pub fn with_values(mut self, collect_values: bool) -> Self {
        self.collect_values = collect_values;
        self
    }

    fn request(&self) -> ActiveSet {
        let values = self.collect_values
            || (self.num_functions > 1 && self.normalization.needs_values());
        if values {
            ActiveSet::VALUES | ActiveSet::GRADIENTS
        } else {
            ActiveSet::GRADIENTS
        }
    }

    /// Draw `num_new_samples` more points and append their gradient blocks.
    ///
    /// Returns the number of sample points actually appended.
    pub fn generate_and_accumulate(
        &mut self,
        model: &dyn FullSpaceModel,
        num_new_samples: usize,
    ) -> Result<usize> {
        if model.num_variables() != self.num_variables || model.num_functions() != self.num_functions
        {
            return Err(SubspaceError::DimensionMismatch(format!(
                "accumulator expects {} variables and {} functions, model has {} and {}",
                self.num_variables,
                self.num_functions,
                model.num_variables(),
                model.num_functions()
            )));
        }
        if !model.supports_gradients() {
            return Err(SubspaceError::Configuration(
                "subspace discovery needs gradients from the full-space model".to_string(),
            ));
        }

        self.sampler
            .configure(num_new_samples, self.seed, &self.rng_name)?;
        let batch = self.sampler.run(model, self.request())?;
        self.append_batch(&batch)
    }

    /// Append an externally produced batch.
    pub fn append_batch(&mut self, batch: &SampleBatch) -> Result<usize> {
        if batch.samples.nrows() != self.num_variables {
            return Err(SubspaceError::DimensionMismatch(format!(
                "batch has {} variables, expected {}",
                batch.samples.nrows(),
                self.num_variables
            )));
        }
        let usable: Vec<(usize, &Response)> = batch
            .responses
            .iter()
            .map(|(&idx, r)| (idx, r))
            .filter(|(idx, _)| *idx < batch.samples.ncols())
            .collect();

        // Validate the whole batch before anything is scaled or appended.
        for &(_, response) in &usable {
            response.check_shape(self.num_variables, self.num_functions)?;
            response.gradients()?;
        }

        if self.num_functions > 1 {
            self.update_scale_factors(&usable)?;
        }

        self.derivatives.reserve(usable.len());
        self.variables.reserve(usable.len());
        for &(idx, response) in &usable {
            let block = self.scaled_block(response)?;
            self.derivatives.append_block(block.view())?;
            self.variables.append_column(batch.samples.column(idx))?;
            if let Some(values) = &response.values {
                if self.request().values() {
                    self.values
                        .push_block(values.view().insert_axis(ndarray::Axis(1)))?;
                }
            }
        }

        info!(
            "Accumulated {} new derivative samples ({} total, {} columns)",
            usable.len(),
            self.derivatives.num_samples(),
            self.derivatives.num_columns()
        );
        Ok(usable.len())
    }

    // Column f of the block is scale * grad(s, f) / gradient_scale_factors[f].
    fn scaled_block(&self, response: &Response) -> Result<Array2<f64>> {
        let gradients = response.gradients()?;
        let mut block = gradients.to_owned();
        for f in 0..self.num_functions {
            let mut column = block.column_mut(f);
            let local = if self.num_functions > 1 {
                match self.normalization {
                    Normalization::LocalGradient => {
                        let norm = column.dot(&column).sqrt();
                        if norm > 0.0 {
                            1.0 / norm
                        } else {
                            1.0
                        }
                    }
                    Normalization::LocalValue => {
                        let value = response.values()?[f].abs();
                        if value > 0.0 {
                            1.0 / value
                        } else {
                            1.0
                        }
                    }
                    _ => 1.0,
                }
            } else {
                1.0
            };
            column *= local / self.gradient_scale_factors[f];
        }
        Ok(block)
    }

    // Mean-based factors come from the newest batch only; earlier columns keep
    // the factors they were written with.
    fn update_scale_factors(&mut self, batch: &[(usize, &Response)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let by_value = match self.normalization {
            Normalization::MeanValue => true,
            Normalization::MeanGradient => false,
            _ => return Ok(()),
        };

        for f in 0..self.num_functions {
            let mut total = 0.0;
            for (_, response) in batch {
                total += if by_value {
                    response.values()?[f].abs()
                } else {
                    let g = response.gradients()?;
                    g.column(f).dot(&g.column(f)).sqrt()
                };
            }
            let mean = total / batch.len() as f64;
            self.gradient_scale_factors[f] = if mean > 0.0 { mean } else { 1.0 };
        }
        debug!("Gradient scale factors: {:?}", self.gradient_scale_factors);
        Ok(())
    }

    pub fn derivative_matrix(&self) -> &DerivativeMatrix {
        &self.derivatives
    }

    pub fn variables_matrix(&self) -> &VariablesMatrix {
        &self.variables
    }

    /// Function values, `num_functions x num_samples`, when they were collected.
    pub fn values_matrix(&self) -> Option<ArrayView2<'_, f64>> {
        if self.values.num_blocks == self.variables.num_samples() && self.values.num_blocks > 0 {
            Some(self.values.view())
        } else {
            None
        }
    }

    pub fn gradient_scale_factors(&self) -> &Array1<f64> {
        &self.gradient_scale_factors
    }

    pub fn total_samples(&self) -> usize {
        self.derivatives.num_samples()
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_functions(&self) -> usize {
        self.num_functions
    }

    /// Discard everything accumulated so far.
    pub fn clear(&mut self) {
        self.derivatives.clear();
        self.variables.clear();
        self.values.clear();
        self.gradient_scale_factors.fill(1.0);
    }
}
