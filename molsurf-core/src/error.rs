//! Error types for molsurf

use thiserror::Error;

/// Main error type for molsurf operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Scene graph error: {0}")]
    SceneGraph(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for molsurf operations
pub type Result<T> = std::result::Result<T, Error>;
