//! Error types for stack synthesis.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("run order violation in stage '{stage}': {message}")]
    RunOrder { stage: String, message: String },

    #[error("cycle detected in stack dependencies: {0}")]
    CycleDetected(String),

    #[error("unknown stack: {0}")]
    UnknownStack(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
