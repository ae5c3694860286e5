//! Tiered conversational memory
//!
//! Hot: per-session buffers in process memory. Warm: semantic index of
//! recent conversation turns. Cold: durable long-term knowledge. The
//! retention manager decides what moves where after each turn.

pub mod archive;
pub mod context;
pub mod hot;
pub mod retention;
pub mod session;
pub mod store;
pub mod types;

pub use archive::{ArchiveCounts, ArchiveOutcome, ArchiveWriter};
pub use context::{ContextAssembler, ContextBundle};
pub use hot::HotBuffer;
pub use retention::{RetentionManager, RetentionReport};
pub use session::{SessionId, SessionIdError};
pub use store::TieredStore;
pub use types::{ArchiveTier, EntryId, Exchange, ExchangeKind, TierEntry, estimate_tokens};
