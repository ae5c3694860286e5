//! Built-in plugins

pub mod auto_summarizer;
pub mod cost_tracker;
pub mod sentiment;

pub use auto_summarizer::AutoSummarizer;
pub use cost_tracker::{CostRecord, CostStats, CostTracker};
pub use sentiment::SentimentTagger;
