//! Payloads threaded through the hook pipeline

use serde::Serialize;
use serde_json::{Map, Value};

use crate::hooks::HookPoint;
use crate::memory::session::SessionId;
use crate::router::{Complexity, ModelTier, QueryAnalysis, RouteOutcome};

/// Incoming message, before context assembly
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub message: String,
    pub session_id: SessionId,
    /// Free-form fields attached by plugins (retrieved documents, flags, ...)
    pub extras: Map<String, Value>,
}

impl QueryPayload {
    pub fn new(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            session_id,
            extras: Map::new(),
        }
    }
}

/// What the router will see
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePayload {
    pub query: String,
    pub context: String,
}

/// Per-turn accounting attached to every result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    pub complexity: Complexity,
    /// Estimated tokens of retrieved context (placeholders excluded)
    pub memory_tokens: usize,
    /// Classifier's token estimate for the query
    pub tokens: u32,
    /// Whether a fresh static cache record was available for the turn
    pub cached: bool,
}

/// Final result of a turn as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub response: String,
    pub model_name: String,
    pub tier: ModelTier,
    pub analysis: QueryAnalysis,
    pub metadata: TurnMetadata,
    /// Annotations added by afterQuery plugins
    pub extras: Map<String, Value>,
}

impl TurnResult {
    pub fn from_route(outcome: RouteOutcome, memory_tokens: usize, cached: bool) -> Self {
        Self {
            metadata: TurnMetadata {
                complexity: outcome.analysis.complexity,
                memory_tokens,
                tokens: outcome.analysis.estimated_tokens,
                cached,
            },
            response: outcome.response,
            model_name: outcome.model_name,
            tier: outcome.tier,
            analysis: outcome.analysis,
            extras: Map::new(),
        }
    }
}

/// Any hook payload, for point-generic dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum HookPayload {
    Query(QueryPayload),
    Route(RoutePayload),
    Turn(TurnResult),
    MemorySave(String),
}

impl HookPayload {
    /// The hook point this payload belongs to
    pub fn point(&self) -> HookPoint {
        match self {
            HookPayload::Query(_) => HookPoint::BeforeQuery,
            HookPayload::Route(_) => HookPoint::OnModelRoute,
            HookPayload::Turn(_) => HookPoint::AfterQuery,
            HookPayload::MemorySave(_) => HookPoint::OnMemorySave,
        }
    }
}
