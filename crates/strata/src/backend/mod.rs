//! Model backends for query answering, classification and summarization
//!
//! Defines the ModelBackend trait that abstracts the transport used to reach
//! a language model. The router, classifier and summarizers only ever see
//! this trait; `RemoteBackend` is the shipped OpenAI-compatible adapter.

pub mod remote;
pub mod types;

use async_trait::async_trait;

use crate::config::ModelConfig;

pub use remote::RemoteBackend;
pub use types::{BackendError, BackendReply};

/// Trait for model backends (remote API, scripted test doubles, ...)
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run a single-prompt completion with the given model profile
    async fn invoke(&self, prompt: &str, model: &ModelConfig)
    -> Result<BackendReply, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
