//! Plugin registry
//!
//! Built once at startup with [`RegistryBuilder`], then shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, StrataError};
use crate::hooks::{
    HookError, HookPayload, HookPoint, Plugin, QueryPayload, RoutePayload, TurnResult,
};

/// Collects plugins in registration order
#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(StrataError::Config(format!(
                "Plugin '{}' is already registered",
                plugin.name()
            )));
        }
        let hooks: Vec<HookPoint> = plugin.hooks().points().collect();
        info!(plugin = plugin.name(), hooks = ?hooks, "Registered plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Chaining form of [`RegistryBuilder::register`]
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Result<Self> {
        self.register(plugin)?;
        Ok(self)
    }

    /// Resolve every plugin's declared hooks into per-point handler lists
    pub fn build(self) -> Registry {
        let mut handlers: HashMap<HookPoint, Vec<Arc<dyn Plugin>>> = HashMap::new();
        for plugin in &self.plugins {
            for point in plugin.hooks().points() {
                handlers.entry(point).or_default().push(Arc::clone(plugin));
            }
        }
        Registry {
            plugins: self.plugins,
            handlers,
        }
    }
}

/// Immutable set of plugins with resolved handler lists
#[derive(Default)]
pub struct Registry {
    plugins: Vec<Arc<dyn Plugin>>,
    handlers: HashMap<HookPoint, Vec<Arc<dyn Plugin>>>,
}

impl Registry {
    /// A registry with no plugins; every hook is the identity
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a plugin by name
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    /// Registered plugin names in registration order
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    fn handlers(&self, point: HookPoint) -> &[Arc<dyn Plugin>] {
        self.handlers.get(&point).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of handlers registered for a point
    pub fn handler_count(&self, point: HookPoint) -> usize {
        self.handlers(point).len()
    }

    pub async fn before_query(&self, mut payload: QueryPayload) -> Result<QueryPayload> {
        for plugin in self.handlers(HookPoint::BeforeQuery) {
            debug!(plugin = plugin.name(), "Running beforeQuery");
            payload = plugin
                .before_query(payload)
                .await
                .map_err(|e| hook_failure(plugin.as_ref(), HookPoint::BeforeQuery, e))?;
        }
        Ok(payload)
    }

    pub async fn on_model_route(&self, mut payload: RoutePayload) -> Result<RoutePayload> {
        for plugin in self.handlers(HookPoint::OnModelRoute) {
            debug!(plugin = plugin.name(), "Running onModelRoute");
            payload = plugin
                .on_model_route(payload)
                .await
                .map_err(|e| hook_failure(plugin.as_ref(), HookPoint::OnModelRoute, e))?;
        }
        Ok(payload)
    }

    pub async fn after_query(&self, mut result: TurnResult) -> Result<TurnResult> {
        for plugin in self.handlers(HookPoint::AfterQuery) {
            debug!(plugin = plugin.name(), "Running afterQuery");
            result = plugin
                .after_query(result)
                .await
                .map_err(|e| hook_failure(plugin.as_ref(), HookPoint::AfterQuery, e))?;
        }
        Ok(result)
    }

    pub async fn on_memory_save(&self, mut text: String) -> Result<String> {
        for plugin in self.handlers(HookPoint::OnMemorySave) {
            debug!(plugin = plugin.name(), "Running onMemorySave");
            text = plugin
                .on_memory_save(text)
                .await
                .map_err(|e| hook_failure(plugin.as_ref(), HookPoint::OnMemorySave, e))?;
        }
        Ok(text)
    }

    /// Point-generic form of the typed folds above.
    ///
    /// The payload variant must match `point`.
    pub async fn execute_hook(&self, point: HookPoint, payload: HookPayload) -> Result<HookPayload> {
        match (point, payload) {
            (HookPoint::BeforeQuery, HookPayload::Query(p)) => {
                self.before_query(p).await.map(HookPayload::Query)
            }
            (HookPoint::OnModelRoute, HookPayload::Route(p)) => {
                self.on_model_route(p).await.map(HookPayload::Route)
            }
            (HookPoint::AfterQuery, HookPayload::Turn(r)) => {
                self.after_query(r).await.map(HookPayload::Turn)
            }
            (HookPoint::OnMemorySave, HookPayload::MemorySave(t)) => {
                self.on_memory_save(t).await.map(HookPayload::MemorySave)
            }
            (point, payload) => Err(StrataError::Hook {
                plugin: "registry".to_string(),
                point,
                source: HookError::new(format!(
                    "payload for {} cannot be passed to {}",
                    payload.point(),
                    point
                )),
            }),
        }
    }
}

fn hook_failure(plugin: &dyn Plugin, point: HookPoint, source: HookError) -> StrataError {
    StrataError::Hook {
        plugin: plugin.name().to_string(),
        point,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookResult, HookSet};
    use crate::memory::session::SessionId;
    use async_trait::async_trait;

    /// Appends its tag to every string payload it sees
    struct Tagger {
        name: &'static str,
        hooks: HookSet,
    }

    #[async_trait]
    impl Plugin for Tagger {
        fn name(&self) -> &str {
            self.name
        }

        fn hooks(&self) -> HookSet {
            self.hooks
        }

        async fn before_query(&self, mut payload: QueryPayload) -> HookResult<QueryPayload> {
            payload.message.push_str(&format!("+{}", self.name));
            Ok(payload)
        }

        async fn on_memory_save(&self, text: String) -> HookResult<String> {
            Ok(format!("{text}+{}", self.name))
        }
    }

    struct Refuser;

    #[async_trait]
    impl Plugin for Refuser {
        fn name(&self) -> &str {
            "refuser"
        }

        fn hooks(&self) -> HookSet {
            HookPoint::OnMemorySave.into()
        }

        async fn on_memory_save(&self, _text: String) -> HookResult<String> {
            Err(HookError::new("archive refused"))
        }
    }

    fn tagger(name: &'static str, hooks: HookSet) -> Arc<dyn Plugin> {
        Arc::new(Tagger { name, hooks })
    }

    fn query() -> QueryPayload {
        QueryPayload::new("msg", SessionId::new("s1").unwrap())
    }

    #[tokio::test]
    async fn test_empty_registry_is_identity() {
        let registry = Registry::empty();
        let payload = query();
        assert_eq!(registry.before_query(payload.clone()).await.unwrap(), payload);
        assert_eq!(registry.on_memory_save("x".to_string()).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let registry = RegistryBuilder::new()
            .with(tagger("a", HookSet::all()))
            .unwrap()
            .with(tagger("b", HookSet::all()))
            .unwrap()
            .build();

        let out = registry.before_query(query()).await.unwrap();
        assert_eq!(out.message, "msg+a+b");
        assert_eq!(registry.plugin_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_undeclared_hooks_are_skipped() {
        let registry = RegistryBuilder::new()
            .with(tagger("only-save", HookPoint::OnMemorySave.into()))
            .unwrap()
            .build();

        assert_eq!(registry.handler_count(HookPoint::BeforeQuery), 0);
        assert_eq!(registry.handler_count(HookPoint::OnMemorySave), 1);

        let out = registry.before_query(query()).await.unwrap();
        assert_eq!(out.message, "msg");
        let saved = registry.on_memory_save("text".to_string()).await.unwrap();
        assert_eq!(saved, "text+only-save");
    }

    #[tokio::test]
    async fn test_hook_error_aborts_fold() {
        let registry = RegistryBuilder::new()
            .with(Arc::new(Refuser))
            .unwrap()
            .with(tagger("after", HookSet::all()))
            .unwrap()
            .build();

        let err = registry.on_memory_save("text".to_string()).await.unwrap_err();
        match err {
            StrataError::Hook { plugin, point, source } => {
                assert_eq!(plugin, "refuser");
                assert_eq!(point, HookPoint::OnMemorySave);
                assert_eq!(source, HookError::new("archive refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(tagger("dup", HookSet::all())).unwrap();
        assert!(matches!(
            builder.register(tagger("dup", HookSet::empty())),
            Err(StrataError::Config(_))
        ));
    }

    #[test]
    fn test_plugin_lookup() {
        let registry = RegistryBuilder::new()
            .with(tagger("a", HookSet::empty()))
            .unwrap()
            .build();
        assert!(registry.plugin("a").is_some());
        assert!(registry.plugin("missing").is_none());
    }

    #[tokio::test]
    async fn test_execute_hook_dispatch() {
        let registry = RegistryBuilder::new()
            .with(tagger("a", HookSet::all()))
            .unwrap()
            .build();

        let out = registry
            .execute_hook(HookPoint::OnMemorySave, HookPayload::MemorySave("t".to_string()))
            .await
            .unwrap();
        assert_eq!(out, HookPayload::MemorySave("t+a".to_string()));

        let mismatch = registry
            .execute_hook(HookPoint::AfterQuery, HookPayload::MemorySave("t".to_string()))
            .await;
        assert!(matches!(
            mismatch,
            Err(StrataError::Hook { point: HookPoint::AfterQuery, .. })
        ));
    }
}
