//! Per-session hot buffer
//!
//! Holds the most recent exchanges of one session in process memory, with
//! an optional summary marker standing in for everything that was compacted.
//! The buffer never evicts on its own: once its running estimate passes the
//! ceiling, the retention manager must compact it.

use std::collections::VecDeque;

use crate::memory::types::Exchange;

/// Ordered exchanges for one session plus a running token estimate
#[derive(Debug, Clone)]
pub struct HotBuffer {
    summary: Option<Exchange>,
    exchanges: VecDeque<Exchange>,
    token_estimate: usize,
    ceiling: usize,
}

impl HotBuffer {
    /// Create an empty buffer that asks for compaction above `ceiling` tokens
    pub fn new(ceiling: usize) -> Self {
        Self {
            summary: None,
            exchanges: VecDeque::new(),
            token_estimate: 0,
            ceiling,
        }
    }

    /// Append a completed exchange
    pub fn push(&mut self, exchange: Exchange) {
        self.token_estimate += exchange.estimate_tokens();
        self.exchanges.push_back(exchange);
    }

    /// True once the estimate has passed the ceiling and a summarization
    /// cycle has not yet settled the buffer
    pub fn needs_summary(&self) -> bool {
        self.token_estimate > self.ceiling
    }

    pub fn token_estimate(&self) -> usize {
        self.token_estimate
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Full contents, oldest first, summary marker at the front
    pub fn history(&self) -> Vec<Exchange> {
        self.summary
            .iter()
            .chain(self.exchanges.iter())
            .cloned()
            .collect()
    }

    /// The most recent `limit` entries, counting the summary marker as the
    /// oldest entry. Never reaches past the marker.
    pub fn window(&self, limit: usize) -> Vec<Exchange> {
        let total = self.len();
        self.summary
            .iter()
            .chain(self.exchanges.iter())
            .skip(total.saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// Replace everything but the last `keep_recent` exchanges with `summary`.
    ///
    /// The estimate restarts from the summary alone, so a compacted buffer
    /// is always considered settled.
    pub fn compact(&mut self, summary: Exchange, keep_recent: usize) {
        let excess = self.exchanges.len().saturating_sub(keep_recent);
        self.exchanges.drain(..excess);
        self.token_estimate = summary.estimate_tokens();
        self.summary = Some(summary);
    }

    /// Render the whole buffer, one exchange per block
    pub fn render(&self) -> String {
        render_exchanges(&self.history())
    }

    /// Drop all exchanges and the summary marker
    pub fn clear(&mut self) {
        self.summary = None;
        self.exchanges.clear();
        self.token_estimate = 0;
    }

    /// Number of entries including the summary marker
    pub fn len(&self) -> usize {
        self.exchanges.len() + usize::from(self.summary.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.exchanges.is_empty()
    }

    /// Iterate entries oldest first, summary marker included
    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.summary.iter().chain(self.exchanges.iter())
    }
}

/// Join rendered exchanges into the hot context section
pub fn render_exchanges(exchanges: &[Exchange]) -> String {
    exchanges
        .iter()
        .map(Exchange::render)
        .collect::<Vec<_>>()
        .join("\n")
}
