//! Build statistics, reported for observation only.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::rank::RankSelection;

/// Summary of one subspace build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStatistics {
    /// Construction method, `"active_subspace"` or `"adapted_basis"`
    pub method: String,

    pub num_variables: usize,

    pub num_functions: usize,

    /// Final reduced rank
    pub rank: usize,

    /// Full-space samples consumed, including any drawn for the surrogate
    pub total_samples: usize,

    /// Singular values of the final derivative matrix (active subspace only)
    pub singular_values: Vec<f64>,

    /// Candidate ranks and diagnostics of the final rank selection
    pub rank_selection: Option<RankSelection>,

    /// Cumulative gap reduction per truncation size (adapted basis only)
    pub truncation_ratios: Vec<f64>,

    /// Samples drawn only to satisfy the final surrogate
    pub surrogate_refinement_samples: usize,
}

impl BuildStatistics {
    pub fn new(method: &str, num_variables: usize, num_functions: usize) -> Self {
        Self {
            method: method.to_string(),
            num_variables,
            num_functions,
            rank: 0,
            total_samples: 0,
            singular_values: Vec::new(),
            rank_selection: None,
            truncation_ratios: Vec::new(),
            surrogate_refinement_samples: 0,
        }
    }

    /// Whether the numerical-rank check lowered the selected rank.
    pub fn numerically_downgraded(&self) -> bool {
        self.rank_selection
            .as_ref()
            .map_or(false, |s| s.numerically_downgraded)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
