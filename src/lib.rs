//! # subspace-uq
//!
//! `subspace-uq` reduces the input dimension of expensive models for
//! uncertainty quantification. Given gradient samples of a black-box
//! full-space model it finds a low-dimensional linear subspace that captures
//! most of the model's sensitivity, decides its rank with competing
//! statistical criteria, and exposes a reduced-coordinate model.
//!
//! The library provides:
//! - Active subspace discovery from the SVD of stacked gradients
//! - Rank selection by energy truncation, Bing Li's ladle estimator,
//!   Constantine's bootstrap metric and cross-validated surrogate error
//! - An adapted basis built from linear polynomial chaos fits
//! - A rotation model mapping points, normal distributions, gradients and
//!   Hessians between full and reduced coordinates
//! - Quadratic moving least squares surrogates over reduced coordinates
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ndarray::{arr1, Array2};
//! use subspace_uq::model::{ActiveSet, ClosureModel, FullSpaceModel};
//! use subspace_uq::sampling::MonteCarloSampler;
//! use subspace_uq::subspace::{ActiveSubspaceConstructor, SubspaceBuilder, SubspaceConfig};
//! use subspace_uq::variables::UncertainVariables;
//!
//! let full = ClosureModel::new(4, 1, |x| arr1(&[(x[0] - 2.0 * x[3]).sin()]))
//!     .with_gradients(|x| {
//!         let c = (x[0] - 2.0 * x[3]).cos();
//!         Array2::from_shape_vec((4, 1), vec![c, 0.0, 0.0, -2.0 * c]).unwrap()
//!     });
//! let variables = UncertainVariables::standard_normals(4)?;
//! let config = SubspaceConfig::default();
//!
//! let sampler = MonteCarloSampler::new(variables.clone(), config.initial_samples, config.seed)?;
//! let mut constructor = ActiveSubspaceConstructor::new(sampler, 1, &config);
//! let build = SubspaceBuilder::new(config, variables)?.build(&full, &mut constructor)?;
//!
//! let reduced = build.reduced_model(full)?;
//! let response = reduced.evaluate(&arr1(&[0.3]), ActiveSet::VALUES)?;
//! println!("{:?}", response.values);
//! # Ok::<(), subspace_uq::SubspaceError>(())
//! ```

pub mod error;
pub mod linalg;
pub mod model;
pub mod reduced;
pub mod sampling;
pub mod subspace;
pub mod surrogate;
pub mod variables;

mod utils;

// Re-exports for convenience
pub use error::{Result, SubspaceError};
pub use model::{ActiveSet, ClosureModel, FullSpaceModel, Response};
pub use reduced::ReducedModel;
pub use subspace::{SubspaceBuild, SubspaceBuilder, SubspaceConfig};
pub use variables::{Marginal, UncertainVariables};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
