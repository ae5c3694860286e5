//! Strata - tiered conversational memory with complexity-based model routing
//!
//! Each turn gathers context from a per-session hot buffer and two vector
//! tiers (warm: recent conversations, cold: long-term facts), classifies the
//! query, routes it to a fast, balanced or deep model, and writes the
//! exchange back. A plugin hook pipeline wraps the whole turn.

pub mod backend;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod orchestrator;
pub mod router;
pub mod storage;
pub mod testing;

pub use error::StrataError;
pub use orchestrator::Orchestrator;
