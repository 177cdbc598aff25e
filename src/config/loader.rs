//! Settings sources: JSON files on disk, or an in-memory map.

use crate::config::{is_identifier, TableSettings};
use crate::error::ConfigError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Where table settings come from. Implementations return raw settings;
/// defaults and validation are applied by the resolver.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self, table: &str) -> Result<TableSettings, ConfigError>;

    /// Human-readable origin, used in logs.
    fn describe(&self, table: &str) -> String;
}

/// Reads `<dir>/<table>.json`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySource { dir: dir.into() }
    }

    fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", table))
    }
}

#[async_trait]
impl SettingsSource for DirectorySource {
    async fn load(&self, table: &str) -> Result<TableSettings, ConfigError> {
        // table names double as file names
        if !is_identifier(table) {
            return Err(ConfigError::NotFound(table.to_string()));
        }
        let path = self.path_for(table);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(table.to_string()));
            }
            Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
        };
        serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
    }

    fn describe(&self, table: &str) -> String {
        self.path_for(table).display().to_string()
    }
}

/// Settings held in memory, for embedding hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    by_table: HashMap<String, TableSettings>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn with(mut self, table: impl Into<String>, settings: TableSettings) -> Self {
        self.insert(table, settings);
        self
    }

    pub fn insert(&mut self, table: impl Into<String>, settings: TableSettings) {
        self.by_table.insert(table.into(), settings);
    }

    /// Parse settings from JSON text.
    pub fn with_json(self, table: impl Into<String>, json: &str) -> Result<Self, ConfigError> {
        let settings = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(self.with(table, settings))
    }
}

#[async_trait]
impl SettingsSource for MemorySource {
    async fn load(&self, table: &str) -> Result<TableSettings, ConfigError> {
        self.by_table
            .get(table)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(table.to_string()))
    }

    fn describe(&self, table: &str) -> String {
        format!("memory:{}", table)
    }
}
