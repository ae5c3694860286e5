//! Write-back policy after each turn
//!
//! Every completed exchange lands in the hot buffer and is queued for the
//! warm tier. Exchanges the classifier marked as worth remembering are also
//! queued for the cold tier. When the hot buffer passes its ceiling it is
//! compacted into a summary plus the most recent exchanges.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::backend::ModelBackend;
use crate::config::ModelConfig;
use crate::memory::archive::ArchiveWriter;
use crate::memory::hot::HotBuffer;
use crate::memory::types::{ArchiveTier, Exchange};
use crate::router::QueryAnalysis;
use crate::router::prompts::SUMMARY_PROMPT;

/// What `record_turn` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionReport {
    /// The hot buffer was compacted this turn
    pub summarized: bool,
    /// A cold write was queued
    pub cold_archived: bool,
    /// Hot estimate after the turn
    pub hot_tokens: usize,
}

pub struct RetentionManager {
    writer: Arc<ArchiveWriter>,
    summarizer: Arc<dyn ModelBackend>,
    summarizer_model: ModelConfig,
    keep_recent: usize,
}

impl RetentionManager {
    pub fn new(
        writer: Arc<ArchiveWriter>,
        summarizer: Arc<dyn ModelBackend>,
        summarizer_model: ModelConfig,
        keep_recent: usize,
    ) -> Self {
        Self {
            writer,
            summarizer,
            summarizer_model,
            keep_recent,
        }
    }

    /// Apply the write-back policy for one completed exchange.
    ///
    /// `archive_text` is what the cold tier receives, after onMemorySave
    /// plugins have rewritten it. Never fails: summarizer errors leave the
    /// buffer over its ceiling so the next turn tries again.
    pub async fn record_turn(
        &self,
        buffer: &mut HotBuffer,
        exchange: Exchange,
        analysis: &QueryAnalysis,
        archive_text: String,
    ) -> RetentionReport {
        let session_id = exchange.session_id.clone();
        let timestamp = exchange.timestamp;
        let warm_text = format!("Human: {}\nAI: {}", exchange.input, exchange.output);

        buffer.push(exchange);
        self.writer
            .submit(
                ArchiveTier::Warm,
                warm_text,
                metadata(session_id.as_str(), "conversation", timestamp.timestamp_millis()),
            )
            .await;

        let summarized = if buffer.needs_summary() {
            self.summarize(buffer).await
        } else {
            false
        };

        if analysis.requires_memory {
            self.writer
                .submit(
                    ArchiveTier::Cold,
                    archive_text,
                    metadata(
                        session_id.as_str(),
                        analysis.query_type.as_str(),
                        Utc::now().timestamp_millis(),
                    ),
                )
                .await;
        }

        RetentionReport {
            summarized,
            cold_archived: analysis.requires_memory,
            hot_tokens: buffer.token_estimate(),
        }
    }

    /// Compact the buffer into `[summary, ...last keep_recent]`
    async fn summarize(&self, buffer: &mut HotBuffer) -> bool {
        let Some(session_id) = buffer.iter().last().map(|e| e.session_id.clone()) else {
            return false;
        };

        info!(
            session = %session_id,
            tokens = buffer.token_estimate(),
            ceiling = buffer.ceiling(),
            "Hot buffer over ceiling, summarizing"
        );

        let prompt = SUMMARY_PROMPT.replace("{conversation}", &buffer.render());
        match self.summarizer.invoke(&prompt, &self.summarizer_model).await {
            Ok(reply) => {
                buffer.compact(Exchange::summary(session_id, reply.content), self.keep_recent);
                info!(tokens = buffer.token_estimate(), "Hot buffer compacted");
                true
            }
            Err(e) => {
                warn!(session = %session_id, "Summarization failed, will retry next turn: {}", e);
                false
            }
        }
    }
}

fn metadata(session_id: &str, entry_type: &str, timestamp_ms: i64) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("session_id".to_string(), Value::from(session_id));
    metadata.insert("type".to_string(), Value::from(entry_type));
    metadata.insert("timestamp".to_string(), Value::from(timestamp_ms));
    metadata
}
