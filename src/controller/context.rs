//! Shared context for the controller.
//!
//! Holds the collaborators every reconcile needs: the resource client
//! registry, the job-sync engine, the plugin inventory, health/metrics
//! state and the work queue (for depth reporting).

use std::sync::Arc;

use crate::client::registry::ClientRegistry;
use crate::crd::ReconcileKey;
use crate::health::HealthState;
use crate::jenkins::{JobSync, PluginInventory};
use crate::queue::RateLimitingQueue;

/// Shared context passed to every reconcile
pub struct Context {
    /// Typed resource clients, resolved at startup
    pub registry: Arc<ClientRegistry>,
    /// Execution-engine job operations
    pub job_sync: Arc<dyn JobSync>,
    /// Installed execution-engine extensions
    pub plugins: Arc<dyn PluginInventory>,
    /// Metrics and heartbeat state
    pub health: Arc<HealthState>,
    /// Work queue, for depth reporting
    pub queue: Arc<RateLimitingQueue<ReconcileKey>>,
}

impl Context {
    pub fn new(
        registry: Arc<ClientRegistry>,
        job_sync: Arc<dyn JobSync>,
        plugins: Arc<dyn PluginInventory>,
        health: Arc<HealthState>,
        queue: Arc<RateLimitingQueue<ReconcileKey>>,
    ) -> Self {
        Self {
            registry,
            job_sync,
            plugins,
            health,
            queue,
        }
    }
}
