//! Vector index seam for the warm and cold tiers
//!
//! The tiered store talks to nearest-neighbour storage only through
//! `VectorIndex`. `LanceIndex` is the shipped LanceDB implementation; tests
//! use the in-memory index from `crate::testing`.

pub mod filter;
pub mod lance;

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::types::TierEntry;

pub use filter::IndexFilter;
pub use lance::LanceIndex;

/// Opaque nearest-neighbour service backing one tier
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` entries closest to `vector`, most relevant first
    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<TierEntry>>;

    /// Append an entry. The caller has already validated its dimension.
    async fn upsert(&self, entry: &TierEntry) -> Result<()>;

    /// Index name for logging
    fn name(&self) -> &str;
}
