//! Query complexity classification
//!
//! Asks a cheap model to describe the query as a small JSON object and
//! decodes it through a typed schema. Anything that goes wrong collapses to
//! a single conservative fallback, so classification never fails a turn.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::ModelBackend;
use crate::config::ModelConfig;
use crate::router::prompts::CLASSIFICATION_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Dialogue,
    Creative,
    Technical,
    Retrieval,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Dialogue => "dialogue",
            QueryType::Creative => "creative",
            QueryType::Technical => "technical",
            QueryType::Retrieval => "retrieval",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for one query. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub complexity: Complexity,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    /// Whether the exchange should be archived to the cold tier
    pub requires_memory: bool,
    pub estimated_tokens: u32,
}

impl QueryAnalysis {
    /// Used whenever the classifier cannot produce a valid verdict
    pub fn fallback() -> Self {
        Self {
            complexity: Complexity::Medium,
            query_type: QueryType::Dialogue,
            requires_memory: true,
            estimated_tokens: 500,
        }
    }

    /// Decode a classifier reply, tolerating a surrounding markdown fence
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(strip_code_fence(raw))
    }
}

/// Strip an optional ```` ```json ... ``` ```` wrapper
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the end of the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Classifies queries with a low-cost backend model
pub struct ComplexityClassifier {
    backend: Arc<dyn ModelBackend>,
    model: ModelConfig,
}

impl ComplexityClassifier {
    pub fn new(backend: Arc<dyn ModelBackend>, model: ModelConfig) -> Self {
        Self { backend, model }
    }

    /// Classify `query`. Backend and decode failures yield
    /// [`QueryAnalysis::fallback`].
    pub async fn classify(&self, query: &str) -> QueryAnalysis {
        let prompt = CLASSIFICATION_PROMPT.replace("{query}", query);

        let reply = match self.backend.invoke(&prompt, &self.model).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(model = %self.model.model, "Classifier call failed, using fallback: {}", e);
                return QueryAnalysis::fallback();
            }
        };

        match QueryAnalysis::parse(&reply.content) {
            Ok(analysis) => {
                debug!(
                    complexity = %analysis.complexity,
                    query_type = %analysis.query_type,
                    "Classified query"
                );
                analysis
            }
            Err(e) => {
                warn!("Classifier reply did not match schema, using fallback: {}", e);
                QueryAnalysis::fallback()
            }
        }
    }
}
