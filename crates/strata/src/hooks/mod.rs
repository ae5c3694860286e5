//! Hook pipeline around each conversational turn
//!
//! Plugins declare which extension points they implement through
//! [`Plugin::hooks`]. The declaration is resolved once, when the registry is
//! built, into one ordered handler list per [`HookPoint`]; at run time each
//! point is a left fold over its list.

pub mod payload;
pub mod plugins;
pub mod registry;

use std::fmt;

use async_trait::async_trait;

pub use payload::{HookPayload, QueryPayload, RoutePayload, TurnMetadata, TurnResult};
pub use registry::{Registry, RegistryBuilder};

/// Extension points, in the order a turn visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before context assembly; may rewrite the message
    BeforeQuery,
    /// Before routing; may override the query and context the router sees
    OnModelRoute,
    /// Before the result is returned; may annotate it
    AfterQuery,
    /// Before cold archival; may rewrite the archived text
    OnMemorySave,
}

impl HookPoint {
    pub const ALL: [HookPoint; 4] = [
        HookPoint::BeforeQuery,
        HookPoint::OnModelRoute,
        HookPoint::AfterQuery,
        HookPoint::OnMemorySave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeQuery => "beforeQuery",
            HookPoint::OnModelRoute => "onModelRoute",
            HookPoint::AfterQuery => "afterQuery",
            HookPoint::OnMemorySave => "onMemorySave",
        }
    }

    fn bit(self) -> u8 {
        match self {
            HookPoint::BeforeQuery => 1,
            HookPoint::OnModelRoute => 1 << 1,
            HookPoint::AfterQuery => 1 << 2,
            HookPoint::OnMemorySave => 1 << 3,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of hook points a plugin implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet(u8);

impl HookSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        HookPoint::ALL.into_iter().collect()
    }

    pub fn with(self, point: HookPoint) -> Self {
        Self(self.0 | point.bit())
    }

    pub fn contains(&self, point: HookPoint) -> bool {
        self.0 & point.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Declared points in turn order
    pub fn points(&self) -> impl Iterator<Item = HookPoint> + '_ {
        HookPoint::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl From<HookPoint> for HookSet {
    fn from(point: HookPoint) -> Self {
        Self::empty().with(point)
    }
}

impl FromIterator<HookPoint> for HookSet {
    fn from_iter<I: IntoIterator<Item = HookPoint>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), HookSet::with)
    }
}

/// Error raised by a plugin handler; aborts the turn
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type HookResult<T> = std::result::Result<T, HookError>;

/// An extension that rewrites turn payloads at declared hook points.
///
/// Every handler defaults to passing its payload through unchanged; only
/// points listed by [`Plugin::hooks`] are ever called by the registry.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry key; must be unique
    fn name(&self) -> &str;

    /// Hook points this plugin implements
    fn hooks(&self) -> HookSet;

    async fn before_query(&self, payload: QueryPayload) -> HookResult<QueryPayload> {
        Ok(payload)
    }

    async fn on_model_route(&self, payload: RoutePayload) -> HookResult<RoutePayload> {
        Ok(payload)
    }

    async fn after_query(&self, result: TurnResult) -> HookResult<TurnResult> {
        Ok(result)
    }

    async fn on_memory_save(&self, text: String) -> HookResult<String> {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_point_wire_names() {
        let names: Vec<_> = HookPoint::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            vec!["beforeQuery", "onModelRoute", "afterQuery", "onMemorySave"]
        );
    }

    #[test]
    fn test_hook_set_membership() {
        let set = HookSet::from(HookPoint::AfterQuery).with(HookPoint::BeforeQuery);
        assert!(set.contains(HookPoint::AfterQuery));
        assert!(set.contains(HookPoint::BeforeQuery));
        assert!(!set.contains(HookPoint::OnMemorySave));
        assert_eq!(
            set.points().collect::<Vec<_>>(),
            vec![HookPoint::BeforeQuery, HookPoint::AfterQuery]
        );

        assert!(HookSet::empty().is_empty());
        assert_eq!(HookSet::all().points().count(), 4);
    }
}
