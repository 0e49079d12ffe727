//! Resource client layer.
//!
//! Reads are served from a local store kept in sync by the informer; writes
//! go through a narrow [`api::ResourceApi`] surface so the control loop can
//! be exercised against in-memory fakes. The production implementation wraps
//! `kube::Api<PipelineConfig>`.

pub mod api;
pub mod kube_api;
pub mod pipeline_config_client;
pub mod registry;
pub mod store;

pub use api::{ApiError, ListOptions, ResourceList, ResourceApi, WatchEvent};
pub use kube_api::KubePipelineConfigApi;
pub use pipeline_config_client::PipelineConfigClient;
pub use registry::{ClientRegistry, ResourceKind};
pub use store::{Store, WatchedResource};
