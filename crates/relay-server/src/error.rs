//! Error taxonomy for the example listener binary.

use thiserror::Error;

/// Failures raised while binding or running the example listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured bind address could not be bound.
    #[error("failed to bind: {0}")]
    Bind(String),
}
