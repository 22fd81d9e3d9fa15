//! Subspace discovery.
//!
//! This module contains the dimension-reduction engine: accumulation of
//! sampled gradients, rank selection over the singular spectrum of the stacked
//! gradients, the rotation between reduced and full coordinates, and the two
//! basis constructors (active subspace and adapted basis).

pub mod accumulator;
pub mod adapted;
pub mod bootstrap;
pub mod builder;
pub mod config;
pub mod constructor;
pub mod cross_validation;
pub mod rank;
pub mod report;
pub mod rotation;

// Re-export key types
pub use accumulator::{DerivativeMatrix, DerivativeSampleAccumulator, VariablesMatrix};
pub use adapted::AdaptedBasisConstructor;
pub use bootstrap::{BootstrapRngState, BootstrapSampler};
pub use builder::{SubspaceBuild, SubspaceBuilder};
pub use config::{CvMetric, Normalization, RankCriteria, SubspaceConfig};
pub use constructor::{ActiveSubspaceConstructor, BasisConstructor, ConstructedBasis};
pub use cross_validation::{CrossValidationData, CrossValidationResult};
pub use rank::{RankSelection, RankSelectionEngine};
pub use report::BuildStatistics;
pub use rotation::{CoordinateFrame, ReducedNormal, SubspaceRotationModel, VariableTransform};
