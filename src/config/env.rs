//! Engine configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_PAGE_SIZE: u64 = 500;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub database_url: String,
    pub settings_dir: PathBuf,
    pub max_page_size: u64,
    pub default_page_size: u64,
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_url: "postgres://localhost/table_engine".into(),
            settings_dir: PathBuf::from("tables"),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_connections: 5,
        }
    }
}

impl EngineConfig {
    /// Read from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = EngineConfig::default();
        let max_page_size = parsed(&lookup, "TABLE_MAX_PAGE_SIZE", d.max_page_size).max(1);
        EngineConfig {
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            settings_dir: lookup("TABLE_SETTINGS_DIR").map(PathBuf::from).unwrap_or(d.settings_dir),
            max_page_size,
            default_page_size: parsed(&lookup, "TABLE_DEFAULT_PAGE_SIZE", d.default_page_size).clamp(1, max_page_size),
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", d.max_connections),
        }
    }
}

fn parsed<T: FromStr + Copy + std::fmt::Display>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{}: invalid value '{}', using {}", key, raw, default);
            default
        }),
    }
}
