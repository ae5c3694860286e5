//! Background tier writes with bounded retry
//!
//! Each write is a spawned task that embeds and stores one entry, retrying
//! with exponential delay up to `max_attempts`. The caller never waits on a
//! write unless it calls [`ArchiveWriter::flush`]. Writes that exhaust their
//! attempts are logged and counted, never raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::ArchiveConfig;
use crate::memory::store::TieredStore;
use crate::memory::types::{ArchiveTier, EntryId};

/// Live counters shared with every write task
#[derive(Debug, Default)]
pub struct ArchiveStats {
    written: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

impl ArchiveStats {
    pub fn snapshot(&self) -> ArchiveCounts {
        ArchiveCounts {
            written: self.written.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ArchiveStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveCounts {
    /// Entries stored successfully
    pub written: u64,
    /// Retry attempts made (not distinct writes)
    pub retried: u64,
    /// Writes abandoned after their last attempt
    pub dropped: u64,
}

/// Final state of one background write
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Written {
        tier: ArchiveTier,
        id: EntryId,
        attempts: u32,
    },
    Dropped {
        tier: ArchiveTier,
        attempts: u32,
        error: String,
    },
}

pub struct ArchiveWriter {
    store: Arc<TieredStore>,
    max_attempts: u32,
    retry_delay: Duration,
    stats: Arc<ArchiveStats>,
    pending: TokioMutex<JoinSet<ArchiveOutcome>>,
}

impl ArchiveWriter {
    pub fn new(store: Arc<TieredStore>, config: &ArchiveConfig) -> Self {
        Self {
            store,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            stats: Arc::new(ArchiveStats::default()),
            pending: TokioMutex::new(JoinSet::new()),
        }
    }

    /// Spawn a write and return immediately
    pub async fn submit(&self, tier: ArchiveTier, content: String, metadata: Map<String, Value>) {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let max_attempts = self.max_attempts;
        let retry_delay = self.retry_delay;

        let mut pending = self.pending.lock().await;
        // Reap finished writes so the set does not grow without bound
        while let Some(done) = pending.try_join_next() {
            if let Err(e) = done {
                error!("Archive task panicked: {}", e);
            }
        }
        pending.spawn(async move {
            write_with_retry(store, tier, content, metadata, max_attempts, retry_delay, stats)
                .await
        });
        debug!(tier = %tier, pending = pending.len(), "Submitted archive write");
    }

    /// Wait for every write submitted so far
    pub async fn flush(&self) -> Vec<ArchiveOutcome> {
        let mut pending = std::mem::take(&mut *self.pending.lock().await);
        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(done) = pending.join_next().await {
            match done {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Archive task panicked: {}", e),
            }
        }
        outcomes
    }

    pub fn stats(&self) -> ArchiveCounts {
        self.stats.snapshot()
    }
}

async fn write_with_retry(
    store: Arc<TieredStore>,
    tier: ArchiveTier,
    content: String,
    metadata: Map<String, Value>,
    max_attempts: u32,
    retry_delay: Duration,
    stats: Arc<ArchiveStats>,
) -> ArchiveOutcome {
    let mut delay = retry_delay;
    let mut attempt = 1;
    loop {
        match store.put(tier, &content, metadata.clone()).await {
            Ok(id) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                debug!(tier = %tier, id = %id, attempt, "Archived entry");
                return ArchiveOutcome::Written {
                    tier,
                    id,
                    attempts: attempt,
                };
            }
            Err(e) if attempt < max_attempts => {
                stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tier = %tier,
                    "Archive write failed on attempt {}/{}, retrying in {:?}: {}",
                    attempt,
                    max_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    tier = %tier,
                    "Archive write dropped after {} attempts: {}",
                    attempt,
                    e
                );
                return ArchiveOutcome::Dropped {
                    tier,
                    attempts: attempt,
                    error: e.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VectorIndex;
    use crate::testing::{FailingIndex, InMemoryIndex, MockEmbedder};

    fn config(max_attempts: u32) -> ArchiveConfig {
        ArchiveConfig {
            max_attempts,
            retry_delay_ms: 1,
        }
    }

    fn store(cold: Arc<dyn VectorIndex>) -> Arc<TieredStore> {
        Arc::new(TieredStore::new(
            Arc::new(InMemoryIndex::new()),
            cold,
            Arc::new(MockEmbedder::new()),
            1_000,
        ))
    }

    #[tokio::test]
    async fn test_write_succeeds_first_try() {
        let cold = Arc::new(InMemoryIndex::new());
        let writer = ArchiveWriter::new(store(cold.clone()), &config(2));

        writer
            .submit(ArchiveTier::Cold, "fact".to_string(), Map::new())
            .await;
        let outcomes = writer.flush().await;

        assert!(matches!(
            outcomes.as_slice(),
            [ArchiveOutcome::Written { attempts: 1, .. }]
        ));
        assert_eq!(cold.len().await, 1);
        assert_eq!(
            writer.stats(),
            ArchiveCounts {
                written: 1,
                retried: 0,
                dropped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let cold = Arc::new(InMemoryIndex::new().with_failures(1));
        let writer = ArchiveWriter::new(store(cold.clone()), &config(2));

        writer
            .submit(ArchiveTier::Cold, "fact".to_string(), Map::new())
            .await;
        let outcomes = writer.flush().await;

        assert!(matches!(
            outcomes.as_slice(),
            [ArchiveOutcome::Written { attempts: 2, .. }]
        ));
        assert_eq!(cold.len().await, 1);
        assert_eq!(writer.stats().retried, 1);
    }

    #[tokio::test]
    async fn test_exhausted_write_is_dropped_and_counted() {
        let cold = Arc::new(FailingIndex::new());
        let writer = ArchiveWriter::new(store(cold.clone()), &config(3));

        writer
            .submit(ArchiveTier::Cold, "fact".to_string(), Map::new())
            .await;
        let outcomes = writer.flush().await;

        assert!(matches!(
            outcomes.as_slice(),
            [ArchiveOutcome::Dropped { attempts: 3, .. }]
        ));
        assert_eq!(cold.upsert_calls(), 3);
        assert_eq!(
            writer.stats(),
            ArchiveCounts {
                written: 0,
                retried: 2,
                dropped: 1
            }
        );
    }

    #[tokio::test]
    async fn test_flush_on_idle_writer() {
        let writer = ArchiveWriter::new(store(Arc::new(InMemoryIndex::new())), &config(2));
        assert!(writer.flush().await.is_empty());
    }
}
