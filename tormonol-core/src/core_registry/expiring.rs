/*
    ExpiringMap - keyed single-use entries with a deadline

    Every handshake store is one of these: an entry is inserted by exactly one step and
    taken by exactly one later step. `take` is the atomic check-and-delete; an entry past
    its deadline is treated as absent even if the sweeper has not run yet, so the sweep
    only bounds memory and never decides correctness.

    ┌──────────┐  insert(k, v)   ┌───────────────┐  take(k)   ┌──────────┐
    │  step N  │ ──────────────► │ k → (v, dl)   │ ─────────► │ step N+1 │
    └──────────┘                 └───────┬───────┘            └──────────┘
                                         │ sweep() at interval
                                         ▼
                                     dropped
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

struct Entry<V> {
    value: V,
    deadline: Instant,
}

/// Thread-safe map whose entries vanish after a fixed TTL
pub struct ExpiringMap<V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> ExpiringMap<V> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // Critical sections never panic midway, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh entry. Hands `value` back if a live entry already exists under
    /// `key`, leaving the map untouched.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Result<(), V> {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(existing) = entries.get(&key) {
            if existing.deadline > now {
                return Err(value);
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                deadline: now + self.ttl,
            },
        );
        trace!(store = self.name, size = entries.len(), "entry added");
        Ok(())
    }

    /// Remove and return the entry for `key` if it exists and has not expired.
    pub fn take(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entry = self.lock().remove(key)?;

        if entry.deadline <= now {
            debug!(store = self.name, "entry taken after expiry, treating as absent");
            return None;
        }

        trace!(store = self.name, "entry taken");
        Some(entry.value)
    }

    /// Whether a live entry exists. Diagnostic only; never use as a check before `take`.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .map(|entry| entry.deadline > now)
            .unwrap_or(false)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.deadline > now);
        let removed = before - entries.len();

        if removed > 0 {
            debug!(store = self.name, removed, remaining = entries.len(), "swept expired entries");
        }
        removed
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything the sweeper can prune
pub trait Sweep: Send + Sync {
    fn sweep(&self) -> usize;
}

impl<V: Send> Sweep for ExpiringMap<V> {
    fn sweep(&self) -> usize {
        ExpiringMap::sweep(self)
    }
}

/// Spawn a task that sweeps `target` every `interval` until aborted.
pub fn spawn_sweeper(target: Arc<dyn Sweep>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            target.sweep();
        }
    })
}
