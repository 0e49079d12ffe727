//! Narrow control-plane API surface consumed by the informer and client.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Parameters for list and watch calls.
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Server-side label selector binding this controller to one downstream
    /// service identity (e.g. `jenkins=ci-main`).
    pub label_selector: Option<String>,
    /// Resource-version cursor to resume a watch from.
    pub resource_version: Option<String>,
    /// Server-side timeout for the call.
    pub timeout: Option<Duration>,
    /// Maximum number of items to return (list only).
    pub limit: Option<u32>,
}

/// A listed collection plus the resource version it was observed at.
#[derive(Clone, Debug)]
pub struct ResourceList<T> {
    pub items: Vec<T>,
    pub resource_version: String,
}

/// A single observation from a watch stream.
#[derive(Clone, Debug)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Progress marker carrying only a resource version.
    Bookmark { resource_version: String },
}

/// Errors surfaced by the control-plane API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The update lost an optimistic-concurrency race.
    #[error("conflict updating '{0}'")]
    Conflict(String),

    /// The object does not exist.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// The requested resource version is too old to resume a watch from.
    #[error("resource version expired: {0}")]
    Expired(String),

    /// Transport-level failure; retryable.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, ApiError::Expired(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::Conflict(_) | ApiError::Expired(_)
        )
    }
}

/// Watch stream item type.
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>, ApiError>>;

/// List, watch and status-update calls against the control plane for one
/// resource type.
#[async_trait]
pub trait ResourceApi<T>: Send + Sync {
    async fn list(&self, opts: &ListOptions) -> Result<ResourceList<T>, ApiError>;

    /// Open a watch from `opts.resource_version`.
    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<T>, ApiError>;

    /// Replace the status of `modified`, failing with [`ApiError::Conflict`]
    /// when the carried resource version no longer matches the authoritative
    /// one.
    async fn update_status(&self, modified: &T) -> Result<T, ApiError>;
}
