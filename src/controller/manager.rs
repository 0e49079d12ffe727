//! Controller manager: the explicit process-wide lifecycle object.
//!
//! Constructed once at startup and passed by reference; `start` wires the
//! informer, event pump, worker pool and connection probe, `stop` tears
//! them down cooperatively (no new work, in-flight reconciles drain), and
//! `restart` applies a changed configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::api::{ListOptions, ResourceApi};
use crate::client::registry::{ClientRegistry, ResourceKind};
use crate::client::store::Store;
use crate::client::PipelineConfigClient;
use crate::config::SyncConfig;
use crate::controller::context::Context;
use crate::controller::reconciler::run_worker;
use crate::crd::{PipelineConfig, RESOURCE_TYPE, ReconcileKey};
use crate::health::HealthState;
use crate::informer::{Informer, ResourceEvent};
use crate::jenkins::{JobSync, PluginInventory};
use crate::queue::RateLimitingQueue;

/// Server-side timeout for watch requests.
const WATCH_TIMEOUT: Duration = Duration::from_secs(300);

struct RunningState {
    shutdown: watch::Sender<bool>,
    queue: Arc<RateLimitingQueue<ReconcileKey>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the controller's task set and the shared object graph.
pub struct ControllerManager {
    config: SyncConfig,
    api: Arc<dyn ResourceApi<PipelineConfig>>,
    job_sync: Arc<dyn JobSync>,
    plugins: Arc<dyn PluginInventory>,
    health: Arc<HealthState>,
    running: Option<RunningState>,
}

impl ControllerManager {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn ResourceApi<PipelineConfig>>,
        job_sync: Arc<dyn JobSync>,
        plugins: Arc<dyn PluginInventory>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            config,
            api,
            job_sync,
            plugins,
            health,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start the informer, event pump, worker pool and connection probe.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        if !self.config.enabled {
            info!("Sync is disabled by configuration, controller not started");
            return;
        }

        info!(
            jenkins_service = %self.config.jenkins_service,
            workers = self.config.worker_count,
            resync_minutes = self.config.resync_period_minutes,
            "Starting controller for PipelineConfig resources"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let store = Arc::new(Store::<PipelineConfig>::new());
        let options = ListOptions {
            label_selector: Some(self.config.label_selector()),
            resource_version: None,
            timeout: Some(WATCH_TIMEOUT),
            limit: None,
        };

        let informer = Arc::new(Informer::new(
            Arc::clone(&self.api),
            Arc::clone(&store),
            options.clone(),
            self.config.resync_period(),
            events_tx,
        ));

        let mut registry = ClientRegistry::new();
        registry.register(
            ResourceKind::PipelineConfig,
            Arc::new(PipelineConfigClient::new(store, Arc::clone(&self.api))),
        );

        let queue = Arc::new(RateLimitingQueue::<ReconcileKey>::new());
        let ctx = Arc::new(Context::new(
            Arc::new(registry),
            Arc::clone(&self.job_sync),
            Arc::clone(&self.plugins),
            Arc::clone(&self.health),
            Arc::clone(&queue),
        ));

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn({
            let informer = Arc::clone(&informer);
            let shutdown = shutdown_rx.clone();
            async move { informer.run(shutdown).await }
        }));

        tasks.push(tokio::spawn(run_event_pump(
            events_rx,
            Arc::clone(&queue),
            Arc::clone(&self.health),
        )));

        for worker in 0..self.config.worker_count {
            tasks.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&queue),
                Arc::clone(&ctx),
            )));
        }

        tasks.push(tokio::spawn(run_connection_probe(
            Arc::clone(&self.api),
            Arc::clone(&self.health),
            options,
            self.config.liveness_threshold(),
            shutdown_rx,
        )));

        self.health.set_ready(true);
        self.running = Some(RunningState {
            shutdown: shutdown_tx,
            queue,
            tasks,
        });
    }

    /// Stop cooperatively: no new work is accepted, in-flight reconciles
    /// drain, the watch connection closes.
    pub async fn stop(&mut self) {
        let Some(state) = self.running.take() else {
            return;
        };
        info!("Stopping controller");
        self.health.set_ready(false);

        let _ = state.shutdown.send(true);
        state.queue.shut_down();
        for task in state.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Controller task ended abnormally");
            }
        }
        info!("Controller stopped");
    }

    /// Apply a changed configuration by restarting the task set.
    pub async fn restart(&mut self, config: SyncConfig) {
        info!("Restarting controller with updated configuration");
        self.stop().await;
        self.config = config;
        self.start();
    }
}

/// Consume informer notifications: count them and enqueue the key.
async fn run_event_pump(
    mut events: mpsc::UnboundedReceiver<ResourceEvent<PipelineConfig>>,
    queue: Arc<RateLimitingQueue<ReconcileKey>>,
    health: Arc<HealthState>,
) {
    while let Some(event) = events.recv().await {
        health.metrics.record_incoming(RESOURCE_TYPE, event.op());
        let key = ReconcileKey::from(event.object().as_ref());
        queue.add(key);
    }
}

/// Mark the process unhealthy when no event has been observed within the
/// threshold while the control plane still reports PipelineConfigs for our
/// label selector.
async fn run_connection_probe(
    api: Arc<dyn ResourceApi<PipelineConfig>>,
    health: Arc<HealthState>,
    options: ListOptions,
    threshold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let started = jiff::Timestamp::now();
    let period = (threshold / 2).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        let stale_since = health
            .last_event_time(RESOURCE_TYPE)
            .unwrap_or(started);
        let elapsed = jiff::Timestamp::now().as_second() - stale_since.as_second();
        if elapsed < threshold.as_secs() as i64 {
            health.set_alive(true);
            continue;
        }

        let probe = ListOptions {
            limit: Some(1),
            timeout: None,
            resource_version: None,
            label_selector: options.label_selector.clone(),
        };
        match api.list(&probe).await {
            Ok(list) => {
                let resource_exists = !list.items.is_empty();
                if resource_exists {
                    warn!(
                        elapsed_secs = elapsed,
                        "No watch events despite existing PipelineConfigs, marking unhealthy"
                    );
                }
                health.set_alive(!resource_exists);
            }
            Err(e) => warn!(error = %e, "Liveness probe list failed"),
        }
    }
}
