//! Per-key distributed-style locking (§4.5). Single-process implementation:
//! a keyed table behind one [`tokio::sync::Mutex`], with a per-key
//! [`Notify`] waking blocked waiters. Fairness is FIFO within a key.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use gateway_common::time::TimestampMs;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::model::LockLease;

struct KeyState {
    lease: Option<LockLease>,
    /// Holders waiting for this key, in arrival order.
    waiters: VecDeque<String>,
    notify: Arc<Notify>,
}

impl KeyState {
    fn new() -> Self {
        Self {
            lease: None,
            waiters: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// A snapshot of one key's lock state, for the [deadlock
/// detector](crate::deadlock::DeadlockDetector)'s wait-for graph.
#[derive(Clone, Debug)]
pub struct LockSnapshot {
    pub key: String,
    pub holder: Option<String>,
    pub holder_acquired_at: Option<TimestampMs>,
    pub waiters: Vec<String>,
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("timed out waiting for lock {key}")]
pub struct LockTimeout {
    pub key: String,
}

/// Exclusive, leased, per-key locking. Invariant: at most one live
/// [`LockLease`] per key at any instant (§8).
pub struct LockService {
    keys: Mutex<HashMap<String, KeyState>>,
}

impl Default for LockService {
    fn default() -> Self {
        Self::new()
    }
}

impl LockService {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks up to `wait` acquiring `key` for `holder`. Expired leases are
    /// treated as absent. FIFO among concurrent waiters on the same key.
    pub async fn acquire(
        &self,
        key: &str,
        holder: &str,
        lease_duration: Duration,
        wait: Duration,
    ) -> Result<LockLease, LockTimeout> {
        let deadline = Instant::now() + wait;
        loop {
            let notify = {
                let mut keys = self.keys.lock().await;
                let state =
                    keys.entry(key.to_string()).or_insert_with(KeyState::new);

                if let Some(lease) = &state.lease {
                    if lease.is_expired(TimestampMs::now()) {
                        state.lease = None;
                    }
                }

                if !state.waiters.iter().any(|h| h == holder) {
                    state.waiters.push_back(holder.to_string());
                }

                let at_front =
                    state.waiters.front().map(|h| h.as_str()) == Some(holder);
                if state.lease.is_none() && at_front {
                    state.waiters.pop_front();
                    let now = TimestampMs::now();
                    let lease = LockLease {
                        key: key.to_string(),
                        holder: holder.to_string(),
                        acquired_at: now,
                        expires_at: now
                            .checked_add(lease_duration)
                            .unwrap_or(now),
                    };
                    state.lease = Some(lease.clone());
                    return Ok(lease);
                }

                state.notify.clone()
            };

            let now = Instant::now();
            if now >= deadline {
                self.abandon_wait(key, holder).await;
                return Err(LockTimeout {
                    key: key.to_string(),
                });
            }
            let remaining = deadline - now;
            if tokio::time::timeout(remaining, notify.notified())
                .await
                .is_err()
            {
                self.abandon_wait(key, holder).await;
                return Err(LockTimeout {
                    key: key.to_string(),
                });
            }
        }
    }

    async fn abandon_wait(&self, key: &str, holder: &str) {
        let mut keys = self.keys.lock().await;
        if let Some(state) = keys.get_mut(key) {
            state.waiters.retain(|h| h != holder);
            state.notify.notify_waiters();
        }
    }

    /// Releases `lease` if it's still the live lease for its key. Idempotent.
    pub async fn release(&self, lease: &LockLease) {
        let mut keys = self.keys.lock().await;
        if let Some(state) = keys.get_mut(&lease.key) {
            let is_current = state
                .lease
                .as_ref()
                .is_some_and(|l| l.holder == lease.holder);
            if is_current {
                state.lease = None;
            }
            state.notify.notify_waiters();
        }
    }

    /// Forcibly drops whatever lease is currently held on `key`, used by the
    /// [deadlock detector](crate::deadlock::DeadlockDetector) to resolve a
    /// detected cycle. Returns the evicted lease, if any.
    pub async fn force_release(&self, key: &str) -> Option<LockLease> {
        let mut keys = self.keys.lock().await;
        let state = keys.get_mut(key)?;
        let evicted = state.lease.take();
        state.notify.notify_waiters();
        evicted
    }

    /// A point-in-time view of every key with a live lease or waiters,
    /// for wait-for graph construction.
    pub async fn snapshot(&self) -> Vec<LockSnapshot> {
        let keys = self.keys.lock().await;
        keys.iter()
            .filter(|(_, s)| s.lease.is_some() || !s.waiters.is_empty())
            .map(|(key, s)| LockSnapshot {
                key: key.clone(),
                holder: s.lease.as_ref().map(|l| l.holder.clone()),
                holder_acquired_at: s.lease.as_ref().map(|l| l.acquired_at),
                waiters: s.waiters.iter().cloned().collect(),
            })
            .collect()
    }
}
