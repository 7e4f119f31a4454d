//! Periodic wait-for-graph cycle detection over the [`LockService`] (§4.8).

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use gateway_common::time::TimestampMs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::lock::{LockService, LockSnapshot};

#[derive(Clone, Debug)]
pub struct DeadlockConfig {
    pub interval: Duration,
    pub auto_resolve: bool,
    pub history_cap: usize,
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            auto_resolve: true,
            history_cap: 100,
        }
    }
}

/// One detected wait-for cycle, in holder ids.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectedCycle {
    pub participants: Vec<String>,
    pub resolved_key: Option<String>,
}

/// Builds the wait-for graph (edges: waiter -> current holder) from
/// [`LockService`] snapshots and looks for cycles. On a cycle, with
/// auto-resolution enabled, evicts the lease held by the youngest
/// participant (the most recently acquired lease among the cycle), causing
/// exactly one waiter to unblock and fail with `Deadlock`.
pub struct DeadlockDetector {
    config: DeadlockConfig,
    history: Mutex<VecDeque<DetectedCycle>>,
}

impl DeadlockDetector {
    pub fn new(config: DeadlockConfig) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn history(&self) -> Vec<DetectedCycle> {
        self.history.lock().await.iter().cloned().collect()
    }

    /// Runs one detection pass against `locks`, resolving any cycle found
    /// if auto-resolution is enabled. Returns the cycles detected this pass.
    pub async fn run_once(&self, locks: &LockService) -> Vec<DetectedCycle> {
        let snapshot = locks.snapshot().await;
        let cycles = find_cycles(&snapshot);

        let mut recorded = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            let mut detected = DetectedCycle {
                participants: cycle.clone(),
                resolved_key: None,
            };

            if self.config.auto_resolve {
                if let Some(key) = youngest_participant_key(&snapshot, &cycle)
                {
                    locks.force_release(&key).await;
                    detected.resolved_key = Some(key);
                }
            }

            warn!(
                participants = ?detected.participants,
                resolved_key = ?detected.resolved_key,
                "deadlock detected"
            );

            let mut history = self.history.lock().await;
            history.push_back(detected.clone());
            while history.len() > self.config.history_cap {
                history.pop_front();
            }

            recorded.push(detected);
        }
        recorded
    }
}

/// Finds cycles in the wait-for graph: an edge `waiter -> holder` exists for
/// every key where `waiter` is blocked behind `holder`. A cycle means every
/// participant is mutually blocked — a deadlock.
fn find_cycles(snapshot: &[LockSnapshot]) -> Vec<Vec<String>> {
    let mut edges: HashMap<&str, HashSet<&str>> = HashMap::new();
    for entry in snapshot {
        let Some(holder) = entry.holder.as_deref() else {
            continue;
        };
        for waiter in &entry.waiters {
            edges.entry(waiter.as_str()).or_default().insert(holder);
        }
    }

    let mut cycles = Vec::new();
    let mut globally_visited: HashSet<&str> = HashSet::new();

    for &start in edges.keys() {
        if globally_visited.contains(start) {
            continue;
        }
        let mut path = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut visited_here: HashSet<&str> = HashSet::new();

        // Iterative DFS tracking the current path to detect back-edges.
        fn dfs<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, HashSet<&'a str>>,
            path: &mut Vec<&'a str>,
            on_path: &mut HashSet<&'a str>,
            visited: &mut HashSet<&'a str>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            if on_path.contains(node) {
                let start_idx = path.iter().position(|n| n == &node).unwrap();
                cycles.push(
                    path[start_idx..].iter().map(|s| s.to_string()).collect(),
                );
                return;
            }
            if visited.contains(node) {
                return;
            }
            visited.insert(node);
            path.push(node);
            on_path.insert(node);
            if let Some(next) = edges.get(node) {
                for &n in next {
                    dfs(n, edges, path, on_path, visited, cycles);
                }
            }
            path.pop();
            on_path.remove(node);
        }

        dfs(
            start,
            &edges,
            &mut path,
            &mut on_path,
            &mut visited_here,
            &mut cycles,
        );
        globally_visited.extend(visited_here);
    }

    cycles
}

/// Among a cycle's participants, finds the lock key whose current holder is
/// the most recently-acquired (the "youngest") — the one auto-resolution
/// evicts.
fn youngest_participant_key(
    snapshot: &[LockSnapshot],
    cycle: &[String],
) -> Option<String> {
    let cycle_set: HashSet<&str> = cycle.iter().map(|s| s.as_str()).collect();
    snapshot
        .iter()
        .filter(|entry| {
            entry
                .holder
                .as_deref()
                .is_some_and(|h| cycle_set.contains(h))
        })
        .max_by_key(|entry| {
            entry.holder_acquired_at.unwrap_or(TimestampMs::now()).as_i64()
        })
        .map(|entry| entry.key.clone())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn no_cycle_when_single_waiter() {
        let locks = LockService::new();
        let _lease = locks
            .acquire("payment:a", "w1", Duration::from_secs(30), Duration::from_millis(10))
            .await
            .unwrap();
        // w2 will time out waiting, but that's not a cycle.
        let _ = locks
            .acquire("payment:a", "w2", Duration::from_secs(30), Duration::from_millis(1))
            .await;

        let detector = DeadlockDetector::new(DeadlockConfig::default());
        let cycles = detector.run_once(&locks).await;
        assert!(cycles.is_empty());
    }

    #[test]
    fn detects_two_party_cycle() {
        let snapshot = vec![
            LockSnapshot {
                key: "payment:a".to_string(),
                holder: Some("w1".to_string()),
                holder_acquired_at: Some(TimestampMs::now()),
                waiters: vec!["w2".to_string()],
            },
            LockSnapshot {
                key: "payment:b".to_string(),
                holder: Some("w2".to_string()),
                holder_acquired_at: Some(TimestampMs::now()),
                waiters: vec!["w1".to_string()],
            },
        ];
        let cycles = find_cycles(&snapshot);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 2);
    }

    #[test]
    fn no_cycle_in_acyclic_chain() {
        let snapshot = vec![
            LockSnapshot {
                key: "payment:a".to_string(),
                holder: Some("w1".to_string()),
                holder_acquired_at: Some(TimestampMs::now()),
                waiters: vec!["w2".to_string()],
            },
            LockSnapshot {
                key: "payment:b".to_string(),
                holder: Some("w3".to_string()),
                holder_acquired_at: Some(TimestampMs::now()),
                waiters: vec!["w2".to_string()],
            },
        ];
        assert!(find_cycles(&snapshot).is_empty());
    }
}
