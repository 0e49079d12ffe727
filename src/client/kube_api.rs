//! kube-backed implementation of the control-plane API surface.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{ListParams, PostParams, WatchParams};
use kube::core::WatchEvent as KubeWatchEvent;
use kube::{Api, Client, ResourceExt};

use crate::client::api::{ApiError, ListOptions, ResourceApi, ResourceList, WatchEvent, WatchStream};
use crate::crd::PipelineConfig;

/// Control-plane access for PipelineConfig resources across all namespaces,
/// filtered server-side by the configured label selector.
pub struct KubePipelineConfigApi {
    client: Client,
}

impl KubePipelineConfigApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn all(&self) -> Api<PipelineConfig> {
        Api::all(self.client.clone())
    }
}

fn map_kube_err(err: kube::Error) -> ApiError {
    match err {
        kube::Error::Api(er) if er.code == 409 => ApiError::Conflict(er.message),
        kube::Error::Api(er) if er.code == 404 => ApiError::NotFound(er.message),
        kube::Error::Api(er) if er.code == 410 => ApiError::Expired(er.message),
        other => ApiError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ResourceApi<PipelineConfig> for KubePipelineConfigApi {
    async fn list(&self, opts: &ListOptions) -> Result<ResourceList<PipelineConfig>, ApiError> {
        let mut lp = ListParams::default();
        if let Some(selector) = &opts.label_selector {
            lp = lp.labels(selector);
        }
        if let Some(timeout) = opts.timeout {
            lp = lp.timeout(timeout.as_secs() as u32);
        }
        if let Some(limit) = opts.limit {
            lp = lp.limit(limit);
        }

        let list = self.all().list(&lp).await.map_err(map_kube_err)?;
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();
        Ok(ResourceList {
            items: list.items,
            resource_version,
        })
    }

    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<PipelineConfig>, ApiError> {
        let mut wp = WatchParams::default();
        if let Some(selector) = &opts.label_selector {
            wp = wp.labels(selector);
        }
        if let Some(timeout) = opts.timeout {
            wp = wp.timeout(timeout.as_secs() as u32);
        }
        let version = opts.resource_version.clone().unwrap_or_else(|| "0".to_string());

        let stream = self
            .all()
            .watch(&wp, &version)
            .await
            .map_err(map_kube_err)?;

        let mapped = stream.map(|item| match item {
            Ok(KubeWatchEvent::Added(object)) => Ok(WatchEvent::Added(object)),
            Ok(KubeWatchEvent::Modified(object)) => Ok(WatchEvent::Modified(object)),
            Ok(KubeWatchEvent::Deleted(object)) => Ok(WatchEvent::Deleted(object)),
            Ok(KubeWatchEvent::Bookmark(bookmark)) => Ok(WatchEvent::Bookmark {
                resource_version: bookmark.metadata.resource_version,
            }),
            Ok(KubeWatchEvent::Error(er)) if er.code == 410 => {
                Err(ApiError::Expired(er.message))
            }
            Ok(KubeWatchEvent::Error(er)) => Err(ApiError::Transport(er.message)),
            Err(e) => Err(map_kube_err(e)),
        });
        Ok(mapped.boxed())
    }

    async fn update_status(&self, modified: &PipelineConfig) -> Result<PipelineConfig, ApiError> {
        let namespace = modified.namespace().unwrap_or_default();
        let name = modified.name_any();
        let api: Api<PipelineConfig> = Api::namespaced(self.client.clone(), &namespace);

        let data = serde_json::to_vec(modified).map_err(|e| ApiError::Transport(e.to_string()))?;
        api.replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(map_kube_err)
    }
}
