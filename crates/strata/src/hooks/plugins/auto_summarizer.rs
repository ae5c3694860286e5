//! Message-count based rolling summaries (onMemorySave)
//!
//! Every `interval` saves, the text about to be archived gets a compact
//! summary appended. This runs alongside the hot buffer's token-based
//! compaction; the two triggers are independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::backend::ModelBackend;
use crate::config::ModelConfig;
use crate::hooks::{HookPoint, HookResult, HookSet, Plugin};
use crate::router::prompts::ROLLING_SUMMARY_PROMPT;

pub struct AutoSummarizer {
    backend: Arc<dyn ModelBackend>,
    model: ModelConfig,
    interval: usize,
    saves: AtomicUsize,
}

impl AutoSummarizer {
    pub const NAME: &'static str = "auto-summarizer";

    pub fn new(backend: Arc<dyn ModelBackend>, model: ModelConfig, interval: usize) -> Self {
        Self {
            backend,
            model,
            interval: interval.max(1),
            saves: AtomicUsize::new(0),
        }
    }

    /// Saves counted since the last successful summary
    pub fn pending_saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for AutoSummarizer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookPoint::OnMemorySave.into()
    }

    async fn on_memory_save(&self, text: String) -> HookResult<String> {
        let saves = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if saves < self.interval {
            return Ok(text);
        }

        info!("Auto-summarizing after {} saves", saves);
        let prompt = ROLLING_SUMMARY_PROMPT.replace("{conversation}", &text);
        match self.backend.invoke(&prompt, &self.model).await {
            Ok(reply) => {
                self.saves.store(0, Ordering::SeqCst);
                Ok(format!("{text}\n\n[SUMMARY: {}]", reply.content))
            }
            Err(e) => {
                // Counter is kept so the next save tries again
                warn!("Auto-summary failed, archiving text as-is: {}", e);
                Ok(text)
            }
        }
    }
}
