//! Watch/informer layer.
//!
//! One informer task per watched resource type. Seeds the local store with a
//! full list, then follows the watch stream from the recorded resource
//! version. Transient watch failures retry from the last known version; an
//! expired version falls back to a fresh list, with the list delta emitted
//! as notifications so missed deletes self-heal. A periodic resync (0 =
//! disabled) re-delivers every cached object as a synthetic update.
//!
//! The store is always updated before the notification is raised.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::api::{ApiError, ListOptions, ResourceApi, WatchEvent};
use crate::client::store::{Store, WatchedResource};

/// Delay before retrying a failed list.
const LIST_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Delay before re-opening a watch after a transport error.
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Lifecycle phase of an informer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InformerPhase {
    Starting,
    ListSync,
    Watching,
    ReListing,
    Stopped,
}

impl fmt::Display for InformerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InformerPhase::Starting => write!(f, "Starting"),
            InformerPhase::ListSync => write!(f, "ListSync"),
            InformerPhase::Watching => write!(f, "Watching"),
            InformerPhase::ReListing => write!(f, "ReListing"),
            InformerPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Notification raised after the local index has been updated.
#[derive(Clone, Debug)]
pub enum ResourceEvent<T> {
    Added(Arc<T>),
    Updated(Arc<T>),
    Deleted(Arc<T>),
}

impl<T> ResourceEvent<T> {
    /// Operation label for metrics.
    pub fn op(&self) -> &'static str {
        match self {
            ResourceEvent::Added(_) => "add",
            ResourceEvent::Updated(_) => "update",
            ResourceEvent::Deleted(_) => "delete",
        }
    }

    pub fn object(&self) -> &Arc<T> {
        match self {
            ResourceEvent::Added(object)
            | ResourceEvent::Updated(object)
            | ResourceEvent::Deleted(object) => object,
        }
    }
}

/// Informer for one resource type.
pub struct Informer<T> {
    api: Arc<dyn ResourceApi<T>>,
    store: Arc<Store<T>>,
    options: ListOptions,
    resync_period: Option<Duration>,
    events: mpsc::UnboundedSender<ResourceEvent<T>>,
    phase: RwLock<InformerPhase>,
}

impl<T> Informer<T>
where
    T: WatchedResource + Send + Sync + 'static,
{
    /// `options` carries the label selector and watch timeout;
    /// `resync_period` of `None` disables periodic resync.
    pub fn new(
        api: Arc<dyn ResourceApi<T>>,
        store: Arc<Store<T>>,
        options: ListOptions,
        resync_period: Option<Duration>,
        events: mpsc::UnboundedSender<ResourceEvent<T>>,
    ) -> Self {
        Self {
            api,
            store,
            options,
            resync_period,
            events,
            phase: RwLock::new(InformerPhase::Starting),
        }
    }

    pub fn phase(&self) -> InformerPhase {
        match self.phase.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, phase: InformerPhase) {
        let mut guard = match self.phase.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != phase {
            debug!(from = %*guard, to = %phase, "Informer phase transition");
            *guard = phase;
        }
    }

    fn emit(&self, event: ResourceEvent<T>) {
        // Receiver gone means the manager is tearing down.
        let _ = self.events.send(event);
    }

    /// Run the informer until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let Some(mut version) = self.list_and_sync(&mut shutdown, InformerPhase::ListSync).await
        else {
            self.set_phase(InformerPhase::Stopped);
            return;
        };

        let mut resync = self.resync_period.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        'watching: loop {
            self.set_phase(InformerPhase::Watching);
            let mut opts = self.options.clone();
            opts.resource_version = Some(version.clone());

            let mut stream = match self.api.watch(&opts).await {
                Ok(stream) => stream,
                Err(e) if e.is_expired() => {
                    warn!(error = %e, "Watch version expired, falling back to full list");
                    match self.list_and_sync(&mut shutdown, InformerPhase::ReListing).await {
                        Some(v) => {
                            version = v;
                            continue 'watching;
                        }
                        None => break 'watching,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to open watch, retrying");
                    if !self.pause(WATCH_RETRY_DELAY, &mut shutdown).await {
                        break 'watching;
                    }
                    continue 'watching;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'watching,
                    _ = tick(&mut resync) => self.resync(),
                    item = stream.next() => match item {
                        Some(Ok(event)) => {
                            if let Some(v) = self.observe(event) {
                                version = v;
                            }
                        }
                        Some(Err(e)) if e.is_expired() => {
                            warn!(error = %e, "Watch expired mid-stream, falling back to full list");
                            match self
                                .list_and_sync(&mut shutdown, InformerPhase::ReListing)
                                .await
                            {
                                Some(v) => {
                                    version = v;
                                    continue 'watching;
                                }
                                None => break 'watching,
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Watch stream error, reconnecting");
                            if !self.pause(WATCH_RETRY_DELAY, &mut shutdown).await {
                                break 'watching;
                            }
                            continue 'watching;
                        }
                        None => {
                            debug!("Watch stream closed, reconnecting");
                            continue 'watching;
                        }
                    },
                }
            }
        }

        self.set_phase(InformerPhase::Stopped);
        info!("Informer stopped");
    }

    /// Full list: replace the store contents, emit the delta, return the
    /// collection resource version. Returns `None` if shutdown interrupts
    /// the retry loop.
    async fn list_and_sync(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        phase: InformerPhase,
    ) -> Option<String> {
        self.set_phase(phase);
        loop {
            let mut opts = self.options.clone();
            opts.resource_version = None;
            opts.timeout = None;

            match self.api.list(&opts).await {
                Ok(list) => {
                    let count = list.items.len();
                    let delta = self.store.replace_all(list.items);
                    for object in delta.added {
                        self.emit(ResourceEvent::Added(object));
                    }
                    for object in delta.updated {
                        self.emit(ResourceEvent::Updated(object));
                    }
                    for object in delta.removed {
                        self.emit(ResourceEvent::Deleted(object));
                    }
                    info!(
                        count,
                        resource_version = %list.resource_version,
                        "List sync complete"
                    );
                    return Some(list.resource_version);
                }
                Err(e) => {
                    warn!(error = %e, "List failed, retrying");
                    if !self.pause(LIST_RETRY_DELAY, shutdown).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Apply one watch observation to the store, then notify. Returns the
    /// resource version to continue the watch from, when the event carries
    /// one.
    fn observe(&self, event: WatchEvent<T>) -> Option<String> {
        match event {
            WatchEvent::Added(object) => {
                let version = object.resource_version();
                let object = self.store.apply(object);
                self.emit(ResourceEvent::Added(object));
                version
            }
            WatchEvent::Modified(object) => {
                let version = object.resource_version();
                let object = self.store.apply(object);
                self.emit(ResourceEvent::Updated(object));
                version
            }
            WatchEvent::Deleted(object) => {
                let version = object.resource_version();
                self.store.delete(&object.reconcile_key());
                self.emit(ResourceEvent::Deleted(Arc::new(object)));
                version
            }
            WatchEvent::Bookmark { resource_version } => Some(resource_version),
        }
    }

    /// Re-deliver every cached object as a synthetic update.
    fn resync(&self) {
        let objects = self.store.list();
        debug!(count = objects.len(), "Periodic resync");
        for object in objects {
            self.emit(ResourceEvent::Updated(object));
        }
    }

    /// Sleep, unless shutdown arrives first. Returns false on shutdown.
    async fn pause(&self, delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => false,
        }
    }
}

async fn tick(resync: &mut Option<tokio::time::Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
