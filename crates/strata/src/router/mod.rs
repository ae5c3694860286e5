//! Complexity-based model routing
//!
//! Classifies each query, picks one of three model tiers with a fixed rule
//! table, and invokes the backend with the assembled context prepended.

pub mod classifier;
pub mod prompts;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::ModelBackend;
use crate::config::{ModelConfig, RouterConfig};
use crate::error::Result;

pub use classifier::{Complexity, ComplexityClassifier, QueryAnalysis, QueryType};

/// Backend model variants, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fastest, cheapest
    Fast,
    /// Default quality tier
    Balanced,
    /// Deep reasoning: lower temperature, larger output budget
    Deep,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::Deep => "deep",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick a tier for an analysis. First matching rule wins.
pub fn select_tier(analysis: &QueryAnalysis) -> ModelTier {
    if analysis.complexity == Complexity::Simple && analysis.estimated_tokens < 1000 {
        ModelTier::Fast
    } else if analysis.query_type == QueryType::Technical
        || analysis.complexity == Complexity::Complex
    {
        ModelTier::Deep
    } else {
        ModelTier::Balanced
    }
}

/// Prepend the context block, or pass the query through when there is none
pub fn build_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        query.to_string()
    } else {
        format!("CONTEXT:\n{context}\n\nUSER QUERY: {query}")
    }
}

/// Result of routing one query
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub response: String,
    /// Model that answered, as reported by the backend
    pub model_name: String,
    pub tier: ModelTier,
    pub analysis: QueryAnalysis,
}

/// Stateless router over a shared backend handle
pub struct ModelRouter {
    backend: Arc<dyn ModelBackend>,
    classifier: ComplexityClassifier,
    fast: ModelConfig,
    balanced: ModelConfig,
    deep: ModelConfig,
}

impl ModelRouter {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &RouterConfig) -> Self {
        Self {
            classifier: ComplexityClassifier::new(Arc::clone(&backend), config.classifier.clone()),
            backend,
            fast: config.fast.clone(),
            balanced: config.balanced.clone(),
            deep: config.deep.clone(),
        }
    }

    /// Model profile used for a tier
    pub fn profile(&self, tier: ModelTier) -> &ModelConfig {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Balanced => &self.balanced,
            ModelTier::Deep => &self.deep,
        }
    }

    /// Classify, select a tier and answer.
    ///
    /// Backend failure on the answering call propagates; there is no retry
    /// and no downgrade to a cheaper tier.
    pub async fn route(&self, query: &str, context: &str) -> Result<RouteOutcome> {
        let analysis = self.classifier.classify(query).await;
        let tier = select_tier(&analysis);
        let profile = self.profile(tier);

        info!(
            tier = %tier,
            model = %profile.model,
            complexity = %analysis.complexity,
            "Routing query"
        );

        let prompt = build_prompt(query, context);
        let reply = self.backend.invoke(&prompt, profile).await?;

        Ok(RouteOutcome {
            response: reply.content,
            model_name: reply.model,
            tier,
            analysis,
        })
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }
}
