//! Retry-on-conflict write execution
//!
//! A transient commit failure re-runs the whole transaction closure against
//! a fresh snapshot, not just the failing step.

use crate::config::RetryPolicy;
use crate::error::{Result, ServiceError};
use lineage_graph::{MemoryStore, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Write path counters
#[derive(Debug, Default)]
pub struct WriteStats {
    commits: AtomicU64,
    retries: AtomicU64,
    rejected: AtomicU64,
    exhausted: AtomicU64,
}

/// Point-in-time copy of [`WriteStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCounts {
    /// Committed transactions
    pub commits: u64,
    /// Re-runs after a transient failure
    pub retries: u64,
    /// Transactions that failed with a non-transient error
    pub rejected: u64,
    /// Transactions abandoned after the retry budget
    pub exhausted: u64,
}

impl WriteStats {
    /// Current counter values
    pub fn counts(&self) -> WriteCounts {
        WriteCounts {
            commits: self.commits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Run `f` as a transaction, re-running it on transient failures
///
/// # Errors
/// - The first non-transient error `f` or the commit returns
/// - `RetryExhausted` once `policy.max_attempts` attempts have failed
pub fn with_retry<T>(
    store: &MemoryStore,
    policy: &RetryPolicy,
    stats: &WriteStats,
    mut f: impl FnMut(&mut Transaction<'_>) -> lineage_graph::Result<T>,
) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match store.transaction(&mut f) {
            Ok(value) => {
                stats.commits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                if attempt >= policy.max_attempts {
                    stats.exhausted.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Write abandoned after {} attempt(s): {}", attempt, e);
                    return Err(ServiceError::RetryExhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                stats.retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Transient write failure (attempt {}/{}): {}",
                    attempt,
                    policy.max_attempts,
                    e
                );
                let delay = policy.backoff(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(e) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_graph::{ContainerId, GlobalId, LineageError, NewNode, NodeKind};

    fn register(tx: &mut Transaction<'_>) -> lineage_graph::Result<u64> {
        tx.register(NewNode::new(
            NodeKind::Sample,
            1,
            GlobalId::parse("S-1")?,
            ContainerId::new(),
            "S-1",
        ))
        .map(|node| node.object_id.0)
    }

    #[test]
    fn retries_until_commit() {
        let store = MemoryStore::new();
        let stats = WriteStats::default();
        store.inject_commit_failures(2);

        let mut calls = 0;
        let result = with_retry(&store, &RetryPolicy::attempts(3), &stats, |tx| {
            calls += 1;
            register(tx)
        });

        assert!(result.is_ok());
        assert_eq!(calls, 3);
        assert_eq!(
            stats.counts(),
            WriteCounts {
                commits: 1,
                retries: 2,
                rejected: 0,
                exhausted: 0,
            }
        );
    }

    #[test]
    fn gives_up_after_budget() {
        let store = MemoryStore::new();
        let stats = WriteStats::default();
        store.inject_commit_failures(5);

        let result = with_retry(&store, &RetryPolicy::attempts(2), &stats, register);

        match result {
            Err(ServiceError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.is_transient());
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert!(store.snapshot().registry().is_empty());
        assert_eq!(stats.counts().exhausted, 1);
    }

    #[test]
    fn rejections_are_not_retried() {
        let store = MemoryStore::new();
        let stats = WriteStats::default();
        let mut calls = 0;

        let result: Result<()> = with_retry(&store, &RetryPolicy::default(), &stats, |_| {
            calls += 1;
            Err(LineageError::InvalidArgument("bad".into()))
        });

        assert!(matches!(result, Err(ServiceError::Graph(_))));
        assert_eq!(calls, 1);
        assert_eq!(stats.counts().rejected, 1);
    }
}
