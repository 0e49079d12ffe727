//! Deduplicating, rate-limited work queue.
//!
//! Keys are coalesced: a key already queued is not duplicated, and a key
//! re-added while it is being processed is marked dirty and re-queued once
//! processing completes. A key is never handed to two workers at once.
//! Failed keys are re-added through [`RateLimitingQueue::add_rate_limited`],
//! which applies per-key exponential backoff; [`RateLimitingQueue::forget`]
//! resets the backoff after a successful reconcile.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

/// Default base delay for the first requeue of a key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on the requeue delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

struct Inner<K> {
    /// Keys waiting to be handed to a worker, in arrival order.
    queue: VecDeque<K>,
    /// Keys that need processing; includes queued keys and keys re-added
    /// while being processed.
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    /// Consecutive failure count per key.
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

/// Work queue of reconciliation keys with deduplication and per-key
/// exponential backoff.
pub struct RateLimitingQueue<K> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

impl<K> RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_delays(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            base_delay,
            max_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a key for processing. No-op if the key is already queued or has
    /// been shut down. A key currently being processed is only marked dirty
    /// and will be re-queued by [`RateLimitingQueue::done`].
    pub fn add(&self, key: K) {
        {
            let mut inner = self.lock();
            if inner.shutting_down || inner.dirty.contains(&key) {
                return;
            }
            inner.dirty.insert(key.clone());
            if inner.processing.contains(&key) {
                return;
            }
            inner.queue.push_back(key);
        }
        self.notify.notify_waiters();
    }

    /// Re-add a key after the backoff delay for its failure count, and bump
    /// the count.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = {
            let mut inner = self.lock();
            if inner.shutting_down {
                return;
            }
            let failures = inner.failures.entry(key.clone()).or_insert(0);
            let delay = backoff_delay(self.base_delay, self.max_delay, *failures);
            *failures += 1;
            delay
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Pull the next key, waiting until one is available. Returns `None`
    /// once the queue is shut down; queued keys are abandoned at that point
    /// so workers exit after their in-flight reconcile.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if inner.shutting_down {
                    return None;
                }
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark a key as done processing. If it was re-added meanwhile (dirty),
    /// it goes back onto the queue so the latest notification is not lost.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut inner = self.lock();
            inner.processing.remove(key);
            if inner.dirty.contains(key) && !inner.shutting_down {
                inner.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Reset the failure count for a key after a successful reconcile.
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    /// Consecutive failure count currently recorded for a key.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Number of keys waiting in the queue (not counting in-flight keys).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The delay the next `add_rate_limited` would apply to this key.
    pub fn next_delay(&self, key: &K) -> Duration {
        let failures = self.num_requeues(key);
        backoff_delay(self.base_delay, self.max_delay, failures)
    }

    /// Stop the queue: `add` becomes a no-op and `get` returns `None`.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

impl<K> Default for RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff: `base * 2^failures`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exp = failures.min(32);
    let delay = base.saturating_mul(2u32.saturating_pow(exp));
    delay.min(max)
}
