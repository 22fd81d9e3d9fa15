use thiserror::Error;

/// Error types for the subspace-uq library.
///
/// Every variant is fatal for the build that raised it: the core never
/// catches or retries any of these.
#[derive(Error, Debug)]
pub enum SubspaceError {
    /// Invalid user configuration detected at construction or validation time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error indicating a mismatch in matrix or vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The derivative matrix produced no singular values.
    #[error("No singular values available: derivative matrix is empty")]
    NoSingularValues,

    /// Rank selection ended with rank 0: the derivative matrix has no detectable signal.
    #[error("Numerical rank deficient: {0}")]
    NumericalRankDeficient(String),

    /// An active variable carries a distribution the reduction cannot transform.
    #[error("Unsupported distribution: {0}")]
    UnsupportedDistribution(String),

    /// A reduced model was used before its rotation was initialized.
    #[error("Invalid state: {0}")]
    Uninitialized(String),

    /// Error during full-space model evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Not enough samples for the requested operation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for subspace-uq operations.
pub type Result<T> = std::result::Result<T, SubspaceError>;
