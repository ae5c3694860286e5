//! Text embeddings for the warm and cold tiers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::error::{Result, StrataError};

/// Dimension of the default multilingual-e5-small model
pub const EMBEDDING_DIMENSION: usize = 384;

/// Turns text into fixed-width vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Width of every vector this embedder produces
    fn dimension(&self) -> usize;
}

/// Local ONNX embedder backed by fastembed
///
/// Inference is CPU-bound and needs exclusive access to the model, so each
/// call runs on the blocking pool behind a mutex.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl FastEmbedder {
    /// Load the model named in `config`. Downloads on first use.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_kind, dimension) = resolve_model(&config.model)?;
        if dimension != config.dimension {
            return Err(StrataError::Config(format!(
                "embedding.dimension is {} but model '{}' produces {} dimensions",
                config.dimension, config.model, dimension
            )));
        }

        let model = TextEmbedding::try_new(InitOptions::new(model_kind))
            .map_err(|e| StrataError::Embedding(e.to_string()))?;

        info!("Loaded embedding model {} ({} dims)", config.model, dimension);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| StrataError::Embedding("Embedding model lock poisoned".to_string()))?;
            model
                .embed(vec![text], None)
                .map_err(|e| StrataError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| StrataError::Embedding(format!("Embedding task failed: {e}")))??;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| StrataError::Embedding("No embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Map a configured model name to the fastembed model and its width
fn resolve_model(name: &str) -> Result<(FastEmbedModel, usize)> {
    let resolved = match name {
        "multilingual-e5-small" => (FastEmbedModel::MultilingualE5Small, 384),
        "multilingual-e5-base" => (FastEmbedModel::MultilingualE5Base, 768),
        "bge-small-en-v1.5" => (FastEmbedModel::BGESmallENV15, 384),
        "all-minilm-l6-v2" => (FastEmbedModel::AllMiniLML6V2, 384),
        "nomic-embed-text-v1.5" => (FastEmbedModel::NomicEmbedTextV15, 768),
        other => {
            return Err(StrataError::Config(format!(
                "Unknown embedding model: {other}"
            )));
        }
    };
    Ok(resolved)
}
