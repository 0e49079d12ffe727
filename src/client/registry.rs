//! Typed registry of resource clients, resolved at startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::client::pipeline_config_client::PipelineConfigClient;

/// Tag identifying a watched resource kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    PipelineConfig,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::PipelineConfig => write!(f, "PipelineConfig"),
        }
    }
}

/// Registry mapping resource kinds to their clients.
///
/// Built once during controller-manager startup; lookups after that are
/// infallible in practice, but callers still handle the `None` rather than
/// panic.
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<ResourceKind, Arc<PipelineConfigClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, client: Arc<PipelineConfigClient>) {
        self.clients.insert(kind, client);
    }

    pub fn pipeline_configs(&self) -> Option<Arc<PipelineConfigClient>> {
        self.clients.get(&ResourceKind::PipelineConfig).cloned()
    }
}
