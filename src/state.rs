use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<PgPool>,
    /// Dashboard card responses, keyed by organization id.
    pub cards_cache: Cache<String, Value>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = db::build_pool(&config);
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set — KPI engine will refuse to run");
        }

        let cards_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.kpi_cards_cache_ttl_seconds.max(1)))
            .max_capacity(config.kpi_cards_cache_max_entries)
            .build();

        Ok(Self {
            config,
            db_pool,
            cards_cache,
        })
    }
}
