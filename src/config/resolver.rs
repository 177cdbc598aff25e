//! Process-wide settings cache keyed by table name.

use crate::config::{validate, ColumnDescriptor, FilterDescriptor, SettingsSource, TableSettings};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<TableSettings>>>;

/// Loads settings lazily on first access and keeps them for the process
/// lifetime. Concurrent first accesses to one table share a single load;
/// a failed load is not cached and the next call retries.
pub struct SettingsResolver {
    source: Arc<dyn SettingsSource>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SettingsResolver {
    pub fn new(source: impl SettingsSource + 'static) -> Self {
        SettingsResolver {
            source: Arc::new(source),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, table: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(table.to_string()).or_default().clone()
    }

    /// Settings for `table`, shared and immutable.
    pub async fn resolve(&self, table: &str) -> Result<Arc<TableSettings>, ConfigError> {
        let slot = self.slot(table);
        if let Some(settings) = slot.get() {
            tracing::trace!(table, "settings cache hit");
            return Ok(settings.clone());
        }
        let loaded = slot
            .get_or_try_init(|| async {
                let mut settings = self.source.load(table).await?;
                settings.key = table.to_string();
                validate(table, &settings)?;
                tracing::info!(table, source = %self.source.describe(table), "settings loaded");
                Ok::<_, ConfigError>(Arc::new(settings))
            })
            .await;
        match loaded {
            Ok(settings) => Ok(settings.clone()),
            Err(e) => {
                self.release(table, &slot);
                Err(e)
            }
        }
    }

    /// Forget an empty slot after a failed load, unless it was replaced meanwhile.
    fn release(&self, table: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.get(table).is_some_and(|s| Arc::ptr_eq(s, slot) && !s.initialized()) {
            slots.remove(table);
        }
    }

    /// Number of tables currently holding a cache slot.
    pub fn cached_len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, ConfigError> {
        Ok(self.resolve(table).await?.columns.clone())
    }

    pub async fn filter_descriptors(&self, table: &str) -> Result<Vec<FilterDescriptor>, ConfigError> {
        Ok(self.resolve(table).await?.filters().to_vec())
    }

    pub fn is_cached(&self, table: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(table).map(|s| s.initialized()).unwrap_or(false)
    }

    /// Drop one cached entry so the next access reloads it.
    pub fn invalidate(&self, table: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(table);
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const FIXTURE: &str = include_str!("../../tests/fixtures/service.json");

    /// Counts loads and sleeps so concurrent callers overlap.
    struct SlowSource {
        inner: MemorySource,
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SettingsSource for SlowSource {
        async fn load(&self, table: &str) -> Result<TableSettings, ConfigError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.load(table).await
        }

        fn describe(&self, table: &str) -> String {
            format!("slow:{}", table)
        }
    }

    fn resolver() -> SettingsResolver {
        SettingsResolver::new(MemorySource::new().with_json("service", FIXTURE).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_returns_settings() {
        let r = resolver();
        let s = r.resolve("service").await.unwrap();
        assert_eq!(s.name, "云服务库");
        assert_eq!(s.primary(), "id");
        assert!(r.is_cached("service"));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let err = resolver().resolve("nope").await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(ref t) if t == "nope"));
    }

    #[tokio::test]
    async fn test_repeated_resolve_is_identical() {
        let r = resolver();
        let a = r.resolve("service").await.unwrap();
        let b = r.resolve("service").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(serde_json::to_value(&*a).unwrap(), serde_json::to_value(&*b).unwrap());
    }

    #[tokio::test]
    async fn test_caller_copies_do_not_leak_into_cache() {
        let r = resolver();
        let mut copy = (*r.resolve("service").await.unwrap()).clone();
        copy.title = Some("changed".into());
        copy.columns.clear();
        let fresh = r.resolve("service").await.unwrap();
        assert_eq!(fresh.title.as_deref(), Some("云服务"));
        assert_eq!(fresh.columns.len(), 9);
    }

    #[tokio::test]
    async fn test_source_table_defaults_to_key() {
        let mut settings: TableSettings = serde_json::from_str(FIXTURE).unwrap();
        settings.source.table = None;
        let r = SettingsResolver::new(MemorySource::new().with("svc_alias", settings));
        let resolved = r.resolve("svc_alias").await.unwrap();
        assert_eq!(resolved.table_name(), "svc_alias");
        assert_eq!(resolved.source.table, None);
    }

    #[tokio::test]
    async fn test_missing_source_block_uses_defaults() {
        let json = r#"{
            "name": "t1",
            "columns": [
                { "name": "id", "type": "bigint" },
                { "name": "title", "type": "string" }
            ]
        }"#;
        let r = SettingsResolver::new(MemorySource::new().with_json("t1", json).unwrap());
        let s = r.resolve("t1").await.unwrap();
        assert_eq!(s.primary(), "id");
        assert_eq!(s.table_name(), "t1");
        assert!(s.primary_column().is_some());
        assert!(s.filters().is_empty());
    }

    #[tokio::test]
    async fn test_resolved_settings_serialize_as_configured() {
        let json = r#"{
            "name": "t1",
            "columns": [
                { "name": "id", "type": "bigint" },
                { "name": "title", "type": "string", "label": "Title", "nullable": false, "component": "input" }
            ],
            "filters": [{ "name": "title" }]
        }"#;
        let r = SettingsResolver::new(MemorySource::new().with_json("t1", json).unwrap());
        let s = r.resolve("t1").await.unwrap();
        let expected: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_value(&*s).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failed_lookups_do_not_grow_cache() {
        let r = resolver();
        for i in 0..1000 {
            assert!(r.resolve(&format!("nope_{}", i)).await.is_err());
        }
        assert_eq!(r.cached_len(), 0);
        r.resolve("service").await.unwrap();
        assert_eq!(r.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_settings_not_cached() {
        let mut settings: TableSettings = serde_json::from_str(FIXTURE).unwrap();
        settings.source.primary = Some("missing".into());
        let r = SettingsResolver::new(MemorySource::new().with("service", settings));
        assert!(matches!(r.resolve("service").await, Err(ConfigError::Invalid { .. })));
        assert!(!r.is_cached("service"));
        assert_eq!(r.cached_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let r = Arc::new(SettingsResolver::new(SlowSource {
            inner: MemorySource::new().with_json("service", FIXTURE).unwrap(),
            loads: loads.clone(),
        }));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.resolve("service").await.map(|s| s.name.clone()) }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "云服务库");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_reloads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let r = SettingsResolver::new(SlowSource {
            inner: MemorySource::new().with_json("service", FIXTURE).unwrap(),
            loads: loads.clone(),
        });
        r.resolve("service").await.unwrap();
        r.invalidate("service");
        assert!(!r.is_cached("service"));
        r.resolve("service").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_derived_accessors() {
        let r = resolver();
        assert_eq!(r.columns("service").await.unwrap()[0].name, "id");
        let filters = r.filter_descriptors("service").await.unwrap();
        assert!(filters.iter().any(|f| f.name == "keyword" && f.column_name() == "name"));
    }
}
