//! Test utilities for strata - mocks and shared models
//!
//! This module provides doubles for every external seam so unit and
//! integration tests run without network access or model downloads:
//! - `MockEmbedder`: deterministic bag-of-words vectors
//! - `InMemoryIndex` / `FailingIndex`: vector index doubles
//! - `ScriptedBackend`: model backend driven by a closure, recording calls

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{BackendError, BackendReply, ModelBackend};
use crate::config::ModelConfig;
use crate::embedding::{EMBEDDING_DIMENSION, Embedder};
use crate::error::{Result, StrataError};
use crate::memory::types::TierEntry;
use crate::storage::{IndexFilter, VectorIndex};

/// Shared fastembed instance, loaded once per test binary.
/// Only available with the `ml-tests` feature since it downloads the model.
#[cfg(feature = "ml-tests")]
pub static SHARED_EMBEDDER: std::sync::LazyLock<crate::embedding::FastEmbedder> =
    std::sync::LazyLock::new(|| {
        crate::embedding::FastEmbedder::new(&crate::config::EmbeddingConfig::default())
            .expect("Failed to load embedding model for tests")
    });

/// Mock embedder for fast tests that don't need real ML.
///
/// Each lowercase word is hashed into one of 384 buckets and the result is
/// L2-normalized, so texts sharing words have high cosine similarity.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    reported_dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            reported_dimension: EMBEDDING_DIMENSION,
        }
    }

    /// Report `dimension` from `dimension()` while still producing
    /// 384-wide vectors. Used to exercise dimension checks.
    pub fn with_reported_dimension(mut self, dimension: usize) -> Self {
        self.reported_dimension = dimension;
        self
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % EMBEDDING_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    fn dimension(&self) -> usize {
        self.reported_dimension
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Brute-force cosine index held in memory
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<TierEntry>>,
    failures_left: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` upserts before accepting writes
    pub fn with_failures(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stored entries in insertion order
    pub async fn entries(&self) -> Vec<TierEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<TierEntry>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &TierEntry)> = entries
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| (cosine_similarity(vector, &e.embedding), e))
            .collect();
        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, e)| e.clone()).collect())
    }

    async fn upsert(&self, entry: &TierEntry) -> Result<()> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StrataError::Storage("injected write failure".to_string()));
        }
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Index whose every call fails, for degraded-tier tests
#[derive(Default)]
pub struct FailingIndex {
    search_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl FailingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn similarity_search(
        &self,
        _vector: &[f32],
        _k: usize,
        _filter: &IndexFilter,
    ) -> Result<Vec<TierEntry>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Err(StrataError::Storage("index unavailable".to_string()))
    }

    async fn upsert(&self, _entry: &TierEntry) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Err(StrataError::Storage("index unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// One backend invocation as seen by a `ScriptedBackend`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

type Script = Box<dyn Fn(&str, &ModelConfig) -> std::result::Result<String, BackendError> + Send + Sync>;

/// Backend that answers through a closure and records every call
pub struct ScriptedBackend {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &ModelConfig) -> std::result::Result<String, BackendError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `text` to every prompt, classifier calls included
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _| Ok(text.clone()))
    }

    /// Fail every call with an API error
    pub fn failing() -> Self {
        Self::new(|_, _| Err(BackendError::Api("API returned 503: scripted failure".to_string())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(
        &self,
        prompt: &str,
        model: &ModelConfig,
    ) -> std::result::Result<BackendReply, BackendError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                prompt: prompt.to_string(),
                model: model.model.clone(),
                temperature: model.temperature,
                max_output_tokens: model.max_output_tokens,
            });
        let content = (self.script)(prompt, model)?;
        Ok(BackendReply::new(content, model.model.clone()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Classifier reply in the shape the classification prompt asks for
pub fn classification_json(
    complexity: &str,
    query_type: &str,
    requires_memory: bool,
    estimated_tokens: u32,
) -> String {
    format!(
        r#"{{"complexity":"{complexity}","type":"{query_type}","requiresMemory":{requires_memory},"estimatedTokens":{estimated_tokens}}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embedding_is_deterministic() {
        assert_eq!(MockEmbedder::vector("hello world"), MockEmbedder::vector("hello world"));
    }

    #[test]
    fn mock_embedding_has_correct_dimensions() {
        assert_eq!(MockEmbedder::vector("test").len(), EMBEDDING_DIMENSION);
        assert_eq!(MockEmbedder::new().with_reported_dimension(768).dimension(), 768);
    }

    #[test]
    fn mock_embedding_is_normalized() {
        let norm: f32 = MockEmbedder::vector("some words here")
            .iter()
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(MockEmbedder::vector("").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mock_embedding_ignores_case_and_punctuation() {
        assert_eq!(
            MockEmbedder::vector("Favorite color?"),
            MockEmbedder::vector("favorite COLOR")
        );
    }

    #[tokio::test]
    async fn in_memory_index_injects_failures() {
        let index = InMemoryIndex::new().with_failures(1);
        let entry = TierEntry::new("x".to_string(), MockEmbedder::vector("x"), Default::default());
        assert!(index.upsert(&entry).await.is_err());
        assert!(index.upsert(&entry).await.is_ok());
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn scripted_backend_records_calls() {
        let backend = ScriptedBackend::replying("ok");
        let model = ModelConfig::new("mini", 0.1, 64);
        let reply = backend.invoke("prompt", &model).await.unwrap();
        assert_eq!(reply.content, "ok");
        assert_eq!(reply.model, "mini");
        assert_eq!(backend.calls()[0].max_output_tokens, 64);
    }
}
