//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (fails when watch events have gone stale)
//! - `/readyz` - Readiness probe (returns 200 once the controller started)
//! - `/metrics` - Prometheus metrics endpoint

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::info;

/// Labels for event metrics (resource type + operation)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EventLabels {
    pub resource: String,
    pub op: String,
}

impl EncodeLabelSet for EventLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("resource", self.resource.as_str()).encode(encoder.encode_label())?;
        ("op", self.op.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-resource-type metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResourceLabels {
    pub resource: String,
}

impl EncodeLabelSet for ResourceLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("resource", self.resource.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the controller
pub struct Metrics {
    /// Incoming watch notifications by operation
    pub incoming_events_total: Family<EventLabels, Counter>,
    /// Completed reconcile attempts
    pub completed_events_total: Family<ResourceLabels, Counter>,
    /// Failed reconcile attempts
    pub reconcile_errors_total: Family<ResourceLabels, Counter>,
    /// Keys currently waiting in the work queue
    pub queue_depth: Family<ResourceLabels, Gauge>,
    /// Reconcile duration histogram
    pub reconcile_duration_seconds: Family<ResourceLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let incoming_events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "sync_incoming_events",
            "Total number of incoming watch events",
            incoming_events_total.clone(),
        );

        let completed_events_total = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "sync_completed_events",
            "Total number of completed reconcile attempts",
            completed_events_total.clone(),
        );

        let reconcile_errors_total = Family::<ResourceLabels, Counter>::default();
        registry.register(
            "sync_reconcile_errors",
            "Total number of failed reconcile attempts",
            reconcile_errors_total.clone(),
        );

        let queue_depth = Family::<ResourceLabels, Gauge>::default();
        registry.register(
            "sync_queue_depth",
            "Number of keys waiting in the work queue",
            queue_depth.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ResourceLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "sync_reconcile_duration_seconds",
            "Duration of reconcile attempts in seconds",
            reconcile_duration_seconds.clone(),
        );

        Self {
            incoming_events_total,
            completed_events_total,
            reconcile_errors_total,
            queue_depth,
            reconcile_duration_seconds,
            registry,
        }
    }

    /// Record an incoming watch event
    pub fn record_incoming(&self, resource: &str, op: &str) {
        let labels = EventLabels {
            resource: resource.to_string(),
            op: op.to_string(),
        };
        self.incoming_events_total.get_or_create(&labels).inc();
    }

    /// Record a completed reconcile attempt and the current queue depth
    pub fn record_completed(&self, resource: &str, queue_depth: usize) {
        let labels = ResourceLabels {
            resource: resource.to_string(),
        };
        self.completed_events_total.get_or_create(&labels).inc();
        self.queue_depth
            .get_or_create(&labels)
            .set(queue_depth as i64);
    }

    /// Record a failed reconcile attempt
    pub fn record_error(&self, resource: &str) {
        let labels = ResourceLabels {
            resource: resource.to_string(),
        };
        self.reconcile_errors_total.get_or_create(&labels).inc();
    }

    /// Record reconcile duration
    pub fn record_duration(&self, resource: &str, duration_secs: f64) {
        let labels = ResourceLabels {
            resource: resource.to_string(),
        };
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server and heartbeat tracking
pub struct HealthState {
    /// Whether the controller manager has started
    ready: AtomicBool,
    /// Whether watch events are flowing (flipped by the connection probe)
    alive: AtomicBool,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last observed event per resource type
    last_event: RwLock<HashMap<&'static str, jiff::Timestamp>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready, alive)
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            metrics: Metrics::new(),
            last_event: RwLock::new(HashMap::new()),
        }
    }

    /// Mark the controller as ready or not ready
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Mark the watch connection as healthy or stale
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Record that an event for this resource type was observed now
    pub fn record_event(&self, resource: &'static str) {
        let mut guard = match self.last_event.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(resource, jiff::Timestamp::now());
    }

    /// Timestamp of the last observed event for this resource type
    pub fn last_event_time(&self, resource: &str) -> Option<jiff::Timestamp> {
        let guard = match self.last_event.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(resource).copied()
    }
}

/// Liveness probe handler
///
/// Returns 503 when the connection probe has marked watch events stale.
async fn healthz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_alive() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "watch events stale").into_response()
    }
}

/// Readiness probe handler
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8080));
    info!(port = 8080, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
