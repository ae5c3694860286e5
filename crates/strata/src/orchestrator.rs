//! Conversation orchestrator
//!
//! Drives one turn end to end:
//!
//! ```text
//! beforeQuery -> assemble context -> onModelRoute -> route
//!   -> afterQuery -> onMemorySave -> retention write-back
//! ```
//!
//! The session's hot buffer is locked for the whole turn, so turns on the
//! same session run one at a time while other sessions proceed.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::cache::{StaticCache, WORLD_CACHE_KEY};
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::hooks::{QueryPayload, Registry, RoutePayload, TurnResult};
use crate::memory::archive::{ArchiveCounts, ArchiveOutcome, ArchiveWriter};
use crate::memory::context::ContextAssembler;
use crate::memory::retention::RetentionManager;
use crate::memory::session::SessionId;
use crate::memory::store::TieredStore;
use crate::memory::types::{ArchiveTier, Exchange};
use crate::router::prompts::cached_context_prompt;
use crate::router::{ModelRouter, ModelTier};
use crate::storage::IndexFilter;

pub struct Orchestrator {
    store: Arc<TieredStore>,
    assembler: ContextAssembler,
    router: ModelRouter,
    retention: RetentionManager,
    writer: Arc<ArchiveWriter>,
    registry: Arc<Registry>,
    cache: StaticCache,
    session_history_limit: usize,
    initialized: OnceCell<()>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        store: Arc<TieredStore>,
        backend: Arc<dyn ModelBackend>,
        registry: Registry,
    ) -> Self {
        let memory = &config.memory;
        let writer = Arc::new(ArchiveWriter::new(Arc::clone(&store), &config.archive));

        Self {
            assembler: ContextAssembler::new(
                Arc::clone(&store),
                memory.hot_history_turns,
                memory.warm_results,
                memory.cold_results,
            ),
            router: ModelRouter::new(Arc::clone(&backend), &config.router),
            retention: RetentionManager::new(
                Arc::clone(&writer),
                backend,
                config.router.summarizer.clone(),
                memory.keep_recent,
            ),
            writer,
            registry: Arc::new(registry),
            cache: StaticCache::new(&config.cache),
            session_history_limit: memory.session_history_limit,
            initialized: OnceCell::new(),
            store,
        }
    }

    /// Prepare the engine, caching `world_data` when it has content.
    ///
    /// Idempotent: only the first call does anything, and concurrent callers
    /// wait for it. A cache failure is logged and the engine still becomes
    /// ready.
    pub async fn initialize(&self, world_data: Option<&Value>) {
        if self.is_initialized() {
            debug!("Orchestrator already initialized");
            return;
        }

        self.initialized
            .get_or_init(|| async {
                match world_data.filter(|data| has_content(data)) {
                    Some(data) => match self.cache.create_world_cache(data).await {
                        Ok(record) => info!(name = %record.name, "World cache created"),
                        Err(e) => {
                            warn!("Could not create world cache, continuing without it: {}", e)
                        }
                    },
                    None => info!("No world data provided, skipping cache creation"),
                }

                info!(
                    plugins = ?self.registry.plugin_names(),
                    "Orchestrator initialized"
                );
            })
            .await;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Run one conversational turn.
    ///
    /// Fails only on an invalid session id, an uninitialized engine, a
    /// backend failure on the answering call, or a hook error. Degraded
    /// tiers and archive failures never fail the turn.
    pub async fn chat(&self, message: &str, session_id: &str) -> Result<TurnResult> {
        if !self.is_initialized() {
            return Err(StrataError::NotInitialized);
        }
        let session = SessionId::new(session_id)?;

        let buffer = self.store.session(&session);
        let mut hot = buffer.lock().await;
        debug!(session = %session, "Starting turn");

        let query = self
            .registry
            .before_query(QueryPayload::new(message, session.clone()))
            .await?;

        let bundle = self.assembler.assemble(&query.message, &hot).await;

        let route = self
            .registry
            .on_model_route(RoutePayload {
                query: query.message.clone(),
                context: bundle.render(),
            })
            .await?;

        let cached = self.cache.get(WORLD_CACHE_KEY).await.is_some();
        let outcome = self.router.route(&route.query, &route.context).await?;
        let analysis = outcome.analysis;

        let result = self
            .registry
            .after_query(TurnResult::from_route(outcome, bundle.token_count, cached))
            .await?;

        let conversation = format!("User: {message}\nAssistant: {}", result.response);
        let archive_text = self.registry.on_memory_save(conversation).await?;

        let report = self
            .retention
            .record_turn(
                &mut hot,
                Exchange::new(session.clone(), message, result.response.clone()),
                &analysis,
                archive_text,
            )
            .await;

        info!(
            session = %session,
            model = %result.model_name,
            tier = %result.tier,
            memory_tokens = bundle.token_count,
            hot_tokens = report.hot_tokens,
            summarized = report.summarized,
            "Turn complete"
        );

        Ok(result)
    }

    /// Wipe the session's hot buffer. Warm and cold entries are kept.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        let session = SessionId::new(session_id)?;
        self.store.clear_session(&session).await;
        info!(session = %session, "Session cleared from hot memory");
        Ok(())
    }

    /// Warm-tier entries recorded for a session. Empty on any failure.
    pub async fn session_history(&self, session_id: &str) -> Vec<String> {
        let session = match SessionId::new(session_id) {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not retrieve history: {}", e);
                return Vec::new();
            }
        };

        let query = format!("session:{session}");
        let filter = IndexFilter::new().with_session(session);
        self.store
            .search_filtered(
                ArchiveTier::Warm,
                &query,
                self.session_history_limit,
                &filter,
            )
            .await
            .into_iter()
            .map(|entry| entry.content)
            .collect()
    }

    /// Answer `query` against a static cache record with the fast model.
    ///
    /// Bypasses the tiers, hooks and retention entirely.
    pub async fn query_with_cache(&self, query: &str, cache_key: &str) -> Result<String> {
        let record = self.cache.require(cache_key).await?;
        let prompt = cached_context_prompt(&record.content, query);

        let profile = self.router.profile(ModelTier::Fast);
        debug!(key = cache_key, model = %profile.model, "Answering from cache");
        let reply = self.router.backend().invoke(&prompt, profile).await?;
        Ok(reply.content)
    }

    /// Wait for every queued archive write
    pub async fn flush(&self) -> Vec<ArchiveOutcome> {
        self.writer.flush().await
    }

    pub fn archive_stats(&self) -> ArchiveCounts {
        self.writer.stats()
    }

    pub fn cache(&self) -> &StaticCache {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TieredStore> {
        &self.store
    }
}

fn has_content(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
