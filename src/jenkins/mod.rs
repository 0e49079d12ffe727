//! Jenkins execution-engine collaborators.
//!
//! The reconciler only sees the [`JobSync`] and [`PluginInventory`] traits;
//! the REST implementation lives in [`rest`]. Conversion failures are
//! terminal at the reconciler layer (recorded as a status condition), I/O
//! failures are retryable.

pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

use crate::crd::{PipelineConfig, ReconcileKey};

pub use rest::{InstalledPlugins, RestJobSync};

/// Errors from job-sync operations.
#[derive(Error, Debug)]
pub enum JobSyncError {
    /// The resource spec cannot produce a valid job definition. Not
    /// retryable; only a spec change can clear it.
    #[error("failed to convert pipeline config: {0}")]
    Conversion(String),

    /// Transport or engine-side failure. Retryable.
    #[error("jenkins I/O error: {0}")]
    Io(String),
}

impl JobSyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobSyncError::Io(_))
    }
}

/// Job create/update/delete surface of the execution engine.
#[async_trait]
pub trait JobSync: Send + Sync {
    /// Whether a job derived from this resource already exists and is up to
    /// date.
    async fn has_synced_job(&self, pc: &PipelineConfig) -> Result<bool, JobSyncError>;

    /// Create or update the job for this resource. Returns false when the
    /// engine rejected the write without raising an error.
    async fn upsert_job(&self, pc: &PipelineConfig) -> Result<bool, JobSyncError>;

    /// Delete the job for this key. Returns false when no such job existed.
    async fn delete_job(&self, key: &ReconcileKey) -> Result<bool, JobSyncError>;
}

/// Lookup of installed engine extensions for the dependency checker.
pub trait PluginInventory: Send + Sync {
    /// Installed version of a plugin, if present.
    fn installed_version(&self, name: &str) -> Option<String>;
}
