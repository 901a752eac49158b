//! A deduplicating, rate-limited work queue of resource keys.

use std::{
    collections::{HashSet, VecDeque},
    num::NonZeroU32,
    sync::Mutex,
};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use tokio::sync::Notify;

use crate::config::QueueConfig;

type QueueLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    /// Keys waiting to be processed, whether pending or re-added while being
    /// processed.
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

/// Resource keys waiting to be reconciled.
///
/// A key added several times before a worker takes it is handed out once. A
/// key added while it is being processed is handed out again after
/// [`done`](Self::done), never to two workers at the same time.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    limiter: Option<QueueLimiter>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("len", &self.len()).finish()
    }
}

impl WorkQueue {
    /// Creates a queue handing out at most `qps` keys per second after an
    /// initial burst of `burst` keys.
    pub fn new(config: &QueueConfig) -> Self {
        let limiter = NonZeroU32::new(config.qps).map(|qps| {
            let burst = NonZeroU32::new(config.burst).unwrap_or(qps);
            RateLimiter::direct(Quota::per_second(qps).allow_burst(burst))
        });
        Self { state: Mutex::new(QueueState::default()), notify: Notify::new(), limiter }
    }

    /// Creates a queue without rate limit.
    pub fn unlimited() -> Self {
        Self { state: Mutex::new(QueueState::default()), notify: Notify::new(), limiter: None }
    }

    /// Enqueues `key` unless it is already waiting. Ignored after
    /// [`shut_down`](Self::shut_down).
    pub fn add(&self, key: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.shutting_down || !state.dirty.insert(key.to_string()) {
            return;
        }
        if state.processing.contains(key) {
            return;
        }
        state.pending.push_back(key.to_string());
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for the next key. Returns `None` once the queue is shut down and
    /// drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            if let Some(key) = self.try_take()? {
                if let Some(limiter) = &self.limiter {
                    limiter.until_ready().await;
                }
                return Some(key);
            }
            notified.await;
        }
    }

    /// `Some(Some(key))` when a key is available, `Some(None)` when the
    /// caller should wait, `None` when the queue is finished.
    fn try_take(&self) -> Option<Option<String>> {
        let mut state = self.state.lock().ok()?;
        match state.pending.pop_front() {
            Some(key) => {
                state.dirty.remove(&key);
                state.processing.insert(key.clone());
                Some(Some(key))
            }
            None if state.shutting_down => None,
            None => Some(None),
        }
    }

    /// Marks `key` as processed; it is queued again if it was added in the
    /// meantime.
    pub fn done(&self, key: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.pending.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stops accepting keys and wakes every waiting worker. Keys already
    /// queued are still handed out.
    pub fn shut_down(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.shutting_down = true;
        }
        self.notify.notify_waiters();
    }

    /// Whether [`shut_down`](Self::shut_down) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().map(|state| state.shutting_down).unwrap_or(true)
    }

    /// Number of keys waiting.
    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or_default()
    }

    /// Whether no key is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
