//! Memory types for Strata
//!
//! Defines the records that move between tiers: completed exchanges held in
//! the hot buffer, and embedded entries stored in the warm and cold indexes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::memory::session::SessionId;

/// Identifier assigned to every warm/cold entry
pub type EntryId = Uuid;

/// Input text of the synthetic exchange that holds a compacted summary
pub const SUMMARY_INPUT: &str = "SUMMARY";

/// Estimate token count using the chars/4 heuristic, rounded up
///
/// This is an approximation for budget management only. Counting chars
/// rather than bytes keeps the estimate stable for non-ASCII text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Distinguishes a real turn from a compacted summary marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Turn,
    Summary,
}

/// One completed user/assistant turn; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub kind: ExchangeKind,
}

impl Exchange {
    /// Create a turn stamped with the current time
    pub fn new(session_id: SessionId, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            timestamp: Utc::now(),
            session_id,
            kind: ExchangeKind::Turn,
        }
    }

    /// Create the synthetic exchange that replaces summarized history
    pub fn summary(session_id: SessionId, summary: impl Into<String>) -> Self {
        Self {
            input: SUMMARY_INPUT.to_string(),
            output: summary.into(),
            timestamp: Utc::now(),
            session_id,
            kind: ExchangeKind::Summary,
        }
    }

    pub fn is_summary(&self) -> bool {
        self.kind == ExchangeKind::Summary
    }

    /// Text form used for hot context and for summarization prompts
    pub fn render(&self) -> String {
        match self.kind {
            ExchangeKind::Turn => format!("Human: {}\nAI: {}", self.input, self.output),
            ExchangeKind::Summary => format!("CONVERSATION SUMMARY: {}", self.output),
        }
    }

    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.input) + estimate_tokens(&self.output)
    }
}

/// The two indexed tiers; the hot tier is never searched by similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTier {
    /// Recent conversation turns for the deployment
    Warm,
    /// Durable long-term knowledge
    Cold,
}

impl ArchiveTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveTier::Warm => "warm",
            ArchiveTier::Cold => "cold",
        }
    }
}

impl std::fmt::Display for ArchiveTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embedded entry in the warm or cold index. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEntry {
    pub id: EntryId,
    pub content: String,
    /// Vector embedding (384 dimensions for e5-small)
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl TierEntry {
    pub fn new(content: String, embedding: Vec<f32>, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            embedding,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// `session_id` metadata, when the writer recorded one
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.get("session_id").and_then(Value::as_str)
    }

    /// `type` metadata ("conversation", "technical", ...)
    pub fn entry_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(Value::as_str)
    }
}
