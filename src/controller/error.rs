//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use thiserror::Error;

use crate::client::api::ApiError;
use crate::client::registry::ResourceKind;
use crate::jenkins::JobSyncError;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Control-plane API error
    #[error("control plane error: {0}")]
    Api(#[from] ApiError),

    /// Execution-engine error
    #[error("job sync error: {0}")]
    JobSync(#[from] JobSyncError),

    /// A resource client was not resolved at startup
    #[error("no client registered for resource kind {0}")]
    ClientNotRegistered(ResourceKind),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_conflict())
    }

    /// Whether another reconcile attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api(e) => e.is_retryable(),
            Error::JobSync(e) => e.is_retryable(),
            Error::ClientNotRegistered(_) | Error::Serialization(_) => false,
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
