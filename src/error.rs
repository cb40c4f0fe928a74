//! Error types for the knngraph engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KnnError>;

#[derive(Error, Debug)]
pub enum KnnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rejected before any parallel work starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The termination flag was raised while the computation was running.
    #[error("Computation terminated")]
    Terminated,

    /// A compressed adjacency stream could not be decoded.
    #[error("Corrupt encoding: {0}")]
    CorruptEncoding(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Node property not found: {0}")]
    PropertyNotFound(String),

    #[error("Type error: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl KnnError {
    /// Cancellation is an outcome of its own, distinct from failures.
    pub fn is_terminated(&self) -> bool {
        matches!(self, KnnError::Terminated)
    }
}

impl From<bincode::Error> for KnnError {
    fn from(err: bincode::Error) -> Self {
        KnnError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for KnnError {
    fn from(err: serde_json::Error) -> Self {
        KnnError::Serialization(err.to_string())
    }
}
