//! Cached, read-through client for PipelineConfig resources.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::debug;

use crate::client::api::{ApiError, ResourceApi};
use crate::client::store::{Store, WatchedResource};
use crate::crd::{PipelineConfig, ReconcileKey};

impl WatchedResource for PipelineConfig {
    fn reconcile_key(&self) -> ReconcileKey {
        ReconcileKey::from(self)
    }

    fn resource_version(&self) -> Option<String> {
        self.metadata.resource_version.clone()
    }
}

/// Client over the watched PipelineConfig collection.
///
/// Reads never hit the network: `get` and `list` are served from the local
/// store the informer maintains. `update` writes through the control-plane
/// API with optimistic concurrency.
pub struct PipelineConfigClient {
    store: Arc<Store<PipelineConfig>>,
    api: Arc<dyn ResourceApi<PipelineConfig>>,
}

impl PipelineConfigClient {
    pub fn new(
        store: Arc<Store<PipelineConfig>>,
        api: Arc<dyn ResourceApi<PipelineConfig>>,
    ) -> Self {
        Self { store, api }
    }

    /// Look up a resource in the local index.
    pub fn get(&self, key: &ReconcileKey) -> Option<Arc<PipelineConfig>> {
        self.store.get(key)
    }

    /// List all resources currently in the local index.
    pub fn list(&self) -> Vec<Arc<PipelineConfig>> {
        self.store.list()
    }

    /// Persist `modified` on top of `original`.
    ///
    /// The write carries `original`'s resource version, so it fails with
    /// [`ApiError::Conflict`] if the authoritative object has moved on.
    /// The caller requeues and the next attempt re-reads fresh state.
    pub async fn update(
        &self,
        original: &PipelineConfig,
        modified: &PipelineConfig,
    ) -> Result<PipelineConfig, ApiError> {
        let mut desired = modified.clone();
        desired.metadata.resource_version = original.metadata.resource_version.clone();

        debug!(
            namespace = %original.namespace().unwrap_or_default(),
            name = %original.name_any(),
            "Updating PipelineConfig status"
        );
        self.api.update_status(&desired).await
    }
}
