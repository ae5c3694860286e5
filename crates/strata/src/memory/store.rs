//! Tiered store: per-session hot buffers plus warm and cold vector indexes
//!
//! Reads from the warm and cold tiers are best-effort. An index or embedding
//! failure is logged and surfaces as an empty result, so a degraded tier can
//! never fail a turn. Writes return errors and are retried by the archive
//! writer.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::{Result, StrataError};
use crate::memory::hot::HotBuffer;
use crate::memory::session::SessionId;
use crate::memory::types::{ArchiveTier, EntryId, Exchange, TierEntry};
use crate::storage::{IndexFilter, VectorIndex};

/// Shared handle to one session's hot buffer
pub type SessionBuffer = Arc<TokioMutex<HotBuffer>>;

pub struct TieredStore {
    sessions: DashMap<SessionId, SessionBuffer>,
    warm: Arc<dyn VectorIndex>,
    cold: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    hot_ceiling: usize,
}

impl TieredStore {
    pub fn new(
        warm: Arc<dyn VectorIndex>,
        cold: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        hot_ceiling: usize,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            warm,
            cold,
            embedder,
            hot_ceiling,
        }
    }

    /// The session's hot buffer, created empty on first use.
    ///
    /// Holding the returned mutex serializes turns for that session.
    pub fn session(&self, session_id: &SessionId) -> SessionBuffer {
        if let Some(buffer) = self.sessions.get(session_id) {
            return Arc::clone(buffer.value());
        }
        let entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(TokioMutex::new(HotBuffer::new(self.hot_ceiling))));
        Arc::clone(entry.value())
    }

    /// The session's hot buffer if one has been created
    pub fn existing_session(&self, session_id: &SessionId) -> Option<SessionBuffer> {
        self.sessions.get(session_id).map(|b| Arc::clone(b.value()))
    }

    /// Up to `limit` most recent hot entries, oldest first.
    ///
    /// Locks the session buffer; do not call while holding it. Unknown
    /// sessions read as empty without allocating a buffer.
    pub async fn hot_history(&self, session_id: &SessionId, limit: usize) -> Vec<Exchange> {
        match self.existing_session(session_id) {
            Some(buffer) => {
                let guard = buffer.lock().await;
                guard.window(limit)
            }
            None => Vec::new(),
        }
    }

    /// Append to the session's hot buffer. Locks the session buffer.
    pub async fn append_hot(&self, session_id: &SessionId, exchange: Exchange) {
        let buffer = self.session(session_id);
        buffer.lock().await.push(exchange);
    }

    /// Drop the session's hot contents. Warm and cold entries are kept.
    ///
    /// The buffer itself is released unless another turn still holds a
    /// handle to it, in which case it stays registered but empty.
    pub async fn clear_session(&self, session_id: &SessionId) {
        let Some(buffer) = self.existing_session(session_id) else {
            return;
        };
        let mut guard = buffer.lock().await;
        guard.clear();
        // Our clone plus the map's own handle
        let released = self
            .sessions
            .remove_if(session_id, |_, held| Arc::strong_count(held) == 2)
            .is_some();
        drop(guard);
        debug!(session = %session_id, released, "Cleared hot buffer");
    }

    /// Number of sessions with a hot buffer
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn index(&self, tier: ArchiveTier) -> &Arc<dyn VectorIndex> {
        match tier {
            ArchiveTier::Warm => &self.warm,
            ArchiveTier::Cold => &self.cold,
        }
    }

    /// Embed `text`, rejecting vectors of the wrong width
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.embedder.dimension() {
            return Err(StrataError::Embedding(format!(
                "Embedder returned {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimension()
            )));
        }
        Ok(vector)
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Nearest neighbours of `query` in a tier, most relevant first
    pub async fn search(&self, tier: ArchiveTier, query: &str, k: usize) -> Vec<TierEntry> {
        self.search_filtered(tier, query, k, &IndexFilter::default()).await
    }

    /// [`TieredStore::search`] restricted by a filter
    pub async fn search_filtered(
        &self,
        tier: ArchiveTier,
        query: &str,
        k: usize,
        filter: &IndexFilter,
    ) -> Vec<TierEntry> {
        let vector = match self.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(tier = %tier, "Embedding failed, treating tier as empty: {}", e);
                return Vec::new();
            }
        };
        self.query_index(tier, &vector, k, filter).await
    }

    /// Search with a precomputed query embedding
    pub async fn search_by_vector(
        &self,
        tier: ArchiveTier,
        vector: &[f32],
        k: usize,
    ) -> Vec<TierEntry> {
        self.query_index(tier, vector, k, &IndexFilter::default()).await
    }

    async fn query_index(
        &self,
        tier: ArchiveTier,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Vec<TierEntry> {
        match self.index(tier).similarity_search(vector, k, filter).await {
            Ok(mut entries) => {
                entries.truncate(k);
                debug!(tier = %tier, "Retrieved {} entries", entries.len());
                entries
            }
            Err(e) => {
                warn!(
                    tier = %tier,
                    index = self.index(tier).name(),
                    "Search failed, treating tier as empty: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    /// Embed and append an entry to a tier
    pub async fn put(
        &self,
        tier: ArchiveTier,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<EntryId> {
        let embedding = self.embed(content).await?;
        let entry = TierEntry::new(content.to_string(), embedding, metadata);
        self.index(tier).upsert(&entry).await?;
        debug!(tier = %tier, id = %entry.id, "Stored entry");
        Ok(entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingIndex, InMemoryIndex, MockEmbedder};

    fn store_with(warm: Arc<dyn VectorIndex>, cold: Arc<dyn VectorIndex>) -> TieredStore {
        TieredStore::new(warm, cold, Arc::new(MockEmbedder::new()), 1_000)
    }

    fn in_memory_store() -> TieredStore {
        store_with(Arc::new(InMemoryIndex::new()), Arc::new(InMemoryIndex::new()))
    }

    #[tokio::test]
    async fn test_hot_round_trip() {
        let store = in_memory_store();
        let s1 = SessionId::new("s1").unwrap();
        let s2 = SessionId::new("s2").unwrap();

        store
            .append_hot(&s1, Exchange::new(s1.clone(), "hello", "hi there"))
            .await;

        let history = store.hot_history(&s1, 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].input, "hello");
        assert_eq!(history[0].output, "hi there");
        assert!(store.hot_history(&s2, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_session_buffer_is_shared() {
        let store = in_memory_store();
        let s1 = SessionId::new("s1").unwrap();
        let a = store.session(&s1);
        let b = store.session(&s1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_register_sessions() {
        let store = in_memory_store();
        let ghost = SessionId::new("ghost").unwrap();

        assert!(store.hot_history(&ghost, 10).await.is_empty());
        store.clear_session(&ghost).await;
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_session_releases_idle_buffer() {
        let store = in_memory_store();
        let s1 = SessionId::new("s1").unwrap();
        let s2 = SessionId::new("s2").unwrap();
        store.append_hot(&s1, Exchange::new(s1.clone(), "q", "a")).await;
        store.append_hot(&s2, Exchange::new(s2.clone(), "q", "a")).await;
        assert_eq!(store.session_count(), 2);

        store.clear_session(&s1).await;
        assert_eq!(store.session_count(), 1);
        assert!(store.hot_history(&s1, 10).await.is_empty());
        assert_eq!(store.hot_history(&s2, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_session_keeps_buffer_held_by_a_turn() {
        let store = in_memory_store();
        let s1 = SessionId::new("s1").unwrap();
        store.append_hot(&s1, Exchange::new(s1.clone(), "q", "a")).await;

        let in_flight = store.session(&s1);
        store.clear_session(&s1).await;

        assert_eq!(store.session_count(), 1);
        assert!(in_flight.lock().await.is_empty());
        assert!(Arc::ptr_eq(&in_flight, &store.session(&s1)));
    }

    #[tokio::test]
    async fn test_search_by_vector_reuses_embedding() {
        let store = in_memory_store();
        store
            .put(ArchiveTier::Warm, "my favorite color is blue", Map::new())
            .await
            .unwrap();
        store
            .put(ArchiveTier::Cold, "rust borrow checker lifetimes", Map::new())
            .await
            .unwrap();

        let vector = store.embed("favorite color").await.unwrap();
        let warm = store.search_by_vector(ArchiveTier::Warm, &vector, 3).await;
        let cold = store.search_by_vector(ArchiveTier::Cold, &vector, 3).await;

        assert_eq!(warm[0].content, "my favorite color is blue");
        assert_eq!(cold.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_session_only_touches_hot_tier() {
        let store = in_memory_store();
        let s1 = SessionId::new("s1").unwrap();
        store
            .append_hot(&s1, Exchange::new(s1.clone(), "q", "a"))
            .await;
        store
            .put(ArchiveTier::Warm, "Human: q\nAI: a", Map::new())
            .await
            .unwrap();

        store.clear_session(&s1).await;

        assert!(store.hot_history(&s1, 10).await.is_empty());
        assert_eq!(store.search(ArchiveTier::Warm, "q", 3).await.len(), 1);
    }

    #[tokio::test]
    async fn test_put_then_search_ranks_by_similarity() {
        let store = in_memory_store();
        store
            .put(ArchiveTier::Cold, "my favorite color is blue", Map::new())
            .await
            .unwrap();
        store
            .put(ArchiveTier::Cold, "rust borrow checker lifetimes", Map::new())
            .await
            .unwrap();

        let results = store
            .search(ArchiveTier::Cold, "what is my favorite color", 1)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "my favorite color is blue");
        assert_eq!(results[0].embedding.len(), store.dimension());

        // Cold writes stay out of the warm tier
        assert!(store.search(ArchiveTier::Warm, "color", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_index_reads_as_empty() {
        let failing = Arc::new(FailingIndex::new());
        let store = store_with(failing.clone(), Arc::new(InMemoryIndex::new()));

        assert!(store.search(ArchiveTier::Warm, "anything", 3).await.is_empty());
        assert_eq!(failing.search_calls(), 1);
        assert!(store.put(ArchiveTier::Warm, "x", Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_on_put() {
        let store = TieredStore::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(MockEmbedder::new().with_reported_dimension(768)),
            1_000,
        );

        let err = store
            .put(ArchiveTier::Warm, "text", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Embedding(_)));
    }
}
