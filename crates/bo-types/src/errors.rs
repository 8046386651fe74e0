use thiserror::Error;

/// Main error type for the optimization workspace
#[derive(Error, Debug)]
pub enum BoError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while building or querying an index
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Expected query to be a 1D vector, got a vector of dim {ndim}")]
    Shape { ndim: usize },

    #[error("Expected query to have dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Query is out of bounds. Call index.lower() and index.upper() for the boundary")]
    OutOfBounds,

    #[error("Expected k to be at least 1, got {k}")]
    InvalidK { k: usize },

    #[error("Cannot build an index from an empty embedding matrix")]
    Empty,

    #[error("Embedding row {row} has dimension {actual}, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid bounds at dimension {dim}: lower {lower} > upper {upper}")]
    InvalidBounds { dim: usize, lower: f64, upper: f64 },

    #[error("Backend {backend} does not support the {distance} distance")]
    UnsupportedDistance { backend: String, distance: String },

    #[error("Unknown distance: {name}. Valid options: euclidean, inner_product, cosine")]
    UnknownDistance { name: String },

    #[error("Whitening failed: {message}")]
    Whitening { message: String },
}

/// Storage and embedding errors
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Expected the encoded embeddings to have dimension {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("Embedder returned {actual} rows for a batch of {expected} texts")]
    BatchSize { expected: usize, actual: usize },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Cannot open file: {path}")]
    NotAFile { path: String },

    #[error("Key not found in storage: {key}")]
    MissingKey { key: String },

    #[error("Failed to parse record at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Storage is empty")]
    EmptyStorage,
}

/// Errors raised by the optimization loop and its generation schedule
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Optimization already terminated, no remaining steps")]
    Terminated,

    #[error("Unsupported render kind: {kind}")]
    UnsupportedRender { kind: String },

    #[error("Candidate is missing parameter {name}")]
    MissingParameter { name: String },

    #[error("Invalid generation step: {message}")]
    InvalidStep { message: String },

    #[error("Unknown generation model: {model}")]
    UnknownModel { model: String },

    #[error("Unknown trial: {trial}")]
    UnknownTrial { trial: usize },

    #[error("Trial {trial} has already been completed")]
    TrialAlreadyCompleted { trial: usize },

    #[error("Generation schedule exhausted after {trials} trials")]
    ScheduleExhausted { trials: usize },

    #[error("Trial budget is unbounded and no step cap was given")]
    Unbounded,

    #[error("Evaluation failed: {message}")]
    Evaluation { message: String },
}

impl From<std::convert::Infallible> for BoError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Result type alias for workspace operations
pub type BoResult<T> = Result<T, BoError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BoError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BoError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BoError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = IndexError::DimensionMismatch {
            expected: 3,
            actual: 5,
        };

        assert!(error.to_string().contains("dimension 3"));
        assert!(error.to_string().contains("got 5"));
    }

    #[test]
    fn test_out_of_bounds_points_at_accessors() {
        let message = IndexError::OutOfBounds.to_string();
        assert!(message.contains("lower()"));
        assert!(message.contains("upper()"));
    }

    #[test]
    fn test_error_conversion() {
        let index_error = IndexError::InvalidK { k: 0 };
        let bo_error: BoError = index_error.into();

        match bo_error {
            BoError::Index(IndexError::InvalidK { k: 0 }) => (),
            _ => panic!("Expected Index error"),
        }

        let bo_error: BoError = OptimizerError::Terminated.into();
        assert!(matches!(bo_error, BoError::Optimizer(OptimizerError::Terminated)));
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, BoError::Validation(ref m) if m == "Invalid value: 42"));

        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, BoError::Internal(_)));

        let config_err = config_error!("Missing required field: {}", "steps");
        assert!(config_err.to_string().contains("steps"));
    }
}
