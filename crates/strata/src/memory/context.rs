//! Context assembly across the three tiers

use std::sync::Arc;

use tracing::{debug, warn};

use crate::memory::hot::{HotBuffer, render_exchanges};
use crate::memory::session::SessionId;
use crate::memory::store::TieredStore;
use crate::memory::types::{ArchiveTier, TierEntry, estimate_tokens};

pub const NO_HOT_CONTEXT: &str = "No recent history";
pub const NO_WARM_CONTEXT: &str = "No relevant past conversations";
pub const NO_COLD_CONTEXT: &str = "No historical data";

/// Text retrieved from each tier for one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    /// Rendered hot window; empty when the session has no history
    pub hot: String,
    /// Warm hits joined by newlines; empty when nothing was retrieved
    pub warm: String,
    /// Cold hits joined by newlines; empty when nothing was retrieved
    pub cold: String,
    /// Approximate size of the retrieved text (chars / 4 per section,
    /// rounded up). Placeholders are not counted.
    pub token_count: usize,
}

impl ContextBundle {
    pub fn new(hot: String, warm: String, cold: String) -> Self {
        let token_count = estimate_tokens(&hot) + estimate_tokens(&warm) + estimate_tokens(&cold);
        Self {
            hot,
            warm,
            cold,
            token_count,
        }
    }

    /// Three labeled sections in fixed order, placeholders for empty tiers
    pub fn render(&self) -> String {
        format!(
            "RECENT CONVERSATION (Hot):\n{}\n\nRELEVANT PAST CONVERSATIONS (Warm):\n{}\n\nHISTORICAL KNOWLEDGE (Cold):\n{}",
            or_placeholder(&self.hot, NO_HOT_CONTEXT),
            or_placeholder(&self.warm, NO_WARM_CONTEXT),
            or_placeholder(&self.cold, NO_COLD_CONTEXT),
        )
    }

    /// True when every tier came back empty
    pub fn is_empty(&self) -> bool {
        self.hot.is_empty() && self.warm.is_empty() && self.cold.is_empty()
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.is_empty() { placeholder } else { text }
}

fn join_entries(entries: &[TierEntry]) -> String {
    entries
        .iter()
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Gathers hot, warm and cold context for a query
pub struct ContextAssembler {
    store: Arc<TieredStore>,
    hot_turns: usize,
    warm_k: usize,
    cold_k: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<TieredStore>, hot_turns: usize, warm_k: usize, cold_k: usize) -> Self {
        Self {
            store,
            hot_turns,
            warm_k,
            cold_k,
        }
    }

    /// Assemble context using an already-locked hot buffer.
    ///
    /// The query is embedded once and both tiers are searched with that
    /// vector concurrently. An index failure empties only its own tier; an
    /// embedding failure leaves just the hot section.
    pub async fn assemble(&self, query: &str, hot: &HotBuffer) -> ContextBundle {
        let hot_text = render_exchanges(&hot.window(self.hot_turns));

        let (warm, cold) = match self.store.embed(query).await {
            Ok(vector) => {
                tokio::join!(
                    self.store.search_by_vector(ArchiveTier::Warm, &vector, self.warm_k),
                    self.store.search_by_vector(ArchiveTier::Cold, &vector, self.cold_k),
                )
            }
            Err(e) => {
                warn!("Query embedding failed, using hot context only: {}", e);
                (Vec::new(), Vec::new())
            }
        };

        let bundle = ContextBundle::new(hot_text, join_entries(&warm), join_entries(&cold));
        debug!(
            warm_hits = warm.len(),
            cold_hits = cold.len(),
            tokens = bundle.token_count,
            "Assembled context"
        );
        bundle
    }

    /// Assemble context for a session, locking its hot buffer for the read.
    ///
    /// A session with no hot buffer gets an empty hot section.
    pub async fn assemble_for_session(&self, query: &str, session_id: &SessionId) -> ContextBundle {
        match self.store.existing_session(session_id) {
            Some(buffer) => {
                let guard = buffer.lock().await;
                self.assemble(query, &guard).await
            }
            None => self.assemble(query, &HotBuffer::new(0)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Exchange;
    use crate::testing::{FailingIndex, InMemoryIndex, MockEmbedder};
    use serde_json::Map;

    fn assembler(store: Arc<TieredStore>) -> ContextAssembler {
        ContextAssembler::new(store, 20, 3, 2)
    }

    #[test]
    fn test_render_uses_placeholders() {
        let rendered = ContextBundle::default().render();
        assert_eq!(
            rendered,
            "RECENT CONVERSATION (Hot):\nNo recent history\n\n\
             RELEVANT PAST CONVERSATIONS (Warm):\nNo relevant past conversations\n\n\
             HISTORICAL KNOWLEDGE (Cold):\nNo historical data"
        );
    }

    #[test]
    fn test_token_count_excludes_placeholders() {
        let bundle = ContextBundle::new("abcde".to_string(), String::new(), String::new());
        assert_eq!(bundle.token_count, 2);
        assert!(!bundle.is_empty());
        assert!(ContextBundle::default().is_empty());
        assert_eq!(ContextBundle::default().token_count, 0);
    }

    #[tokio::test]
    async fn test_assemble_reads_all_tiers() {
        let store = Arc::new(TieredStore::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(MockEmbedder::new()),
            1_000,
        ));
        store
            .put(ArchiveTier::Warm, "we talked about favorite colors", Map::new())
            .await
            .unwrap();
        store
            .put(ArchiveTier::Cold, "favorite color is blue", Map::new())
            .await
            .unwrap();

        let s1 = SessionId::new("s1").unwrap();
        let mut hot = HotBuffer::new(1_000);
        hot.push(Exchange::new(s1, "hi", "hello"));

        let bundle = assembler(store).assemble("favorite color", &hot).await;
        assert_eq!(bundle.hot, "Human: hi\nAI: hello");
        assert_eq!(bundle.warm, "we talked about favorite colors");
        assert_eq!(bundle.cold, "favorite color is blue");
        assert_eq!(
            bundle.token_count,
            estimate_tokens(&bundle.hot) + estimate_tokens(&bundle.warm) + estimate_tokens(&bundle.cold)
        );
    }

    #[tokio::test]
    async fn test_assemble_is_stable_without_writes() {
        let store = Arc::new(TieredStore::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(MockEmbedder::new()),
            1_000,
        ));
        for i in 0..5 {
            store
                .put(ArchiveTier::Warm, &format!("note number {i}"), Map::new())
                .await
                .unwrap();
        }
        let assembler = assembler(store);
        let hot = HotBuffer::new(1_000);

        let first = assembler.assemble("note", &hot).await;
        let second = assembler.assemble("note", &hot).await;
        assert_eq!(first.token_count, second.token_count);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_assemble_for_session_reads_session_buffer() {
        let store = Arc::new(TieredStore::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(MockEmbedder::new()),
            1_000,
        ));
        let alice = SessionId::new("alice@example.com").unwrap();
        let bob = SessionId::new("bob").unwrap();
        store
            .append_hot(&alice, Exchange::new(alice.clone(), "I like tea", "Noted."))
            .await;
        store
            .append_hot(&bob, Exchange::new(bob.clone(), "I like coffee", "Sure."))
            .await;
        let assembler = assembler(Arc::clone(&store));

        let bundle = assembler.assemble_for_session("what do I like", &alice).await;
        assert_eq!(bundle.hot, "Human: I like tea\nAI: Noted.");

        // Same text as assembling against the locked buffer directly
        let buffer = store.session(&alice);
        let direct = assembler.assemble("what do I like", &*buffer.lock().await).await;
        assert_eq!(bundle, direct);

        // The lock is released once assembly returns
        assert!(buffer.try_lock().is_ok());

        let fresh = assembler
            .assemble_for_session("anything", &SessionId::new("carol").unwrap())
            .await;
        assert!(fresh.is_empty());
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_tiers_degrade_to_hot_only() {
        let store = Arc::new(TieredStore::new(
            Arc::new(FailingIndex::new()),
            Arc::new(FailingIndex::new()),
            Arc::new(MockEmbedder::new()),
            1_000,
        ));
        let s1 = SessionId::new("s1").unwrap();
        let mut hot = HotBuffer::new(1_000);
        hot.push(Exchange::new(s1, "abcd", "efgh"));

        let bundle = assembler(store).assemble("anything", &hot).await;
        assert!(bundle.warm.is_empty());
        assert!(bundle.cold.is_empty());
        assert_eq!(bundle.token_count, estimate_tokens(&bundle.hot));
        assert!(bundle.render().contains(NO_WARM_CONTEXT));
        assert!(bundle.render().contains(NO_COLD_CONTEXT));
    }
}
