//! Shared engine state handed to every call.

use crate::config::{EngineConfig, SettingsResolver, SettingsSource};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineState {
    pub pool: PgPool,
    pub settings: Arc<SettingsResolver>,
    pub max_page_size: u64,
    pub default_page_size: u64,
}

impl EngineState {
    pub fn new(pool: PgPool, source: impl SettingsSource + 'static, config: &EngineConfig) -> Self {
        EngineState {
            pool,
            settings: Arc::new(SettingsResolver::new(source)),
            max_page_size: config.max_page_size,
            default_page_size: config.default_page_size,
        }
    }
}
