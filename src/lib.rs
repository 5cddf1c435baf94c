pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use crate::infra::{cache::RedisCache, db::Db, queue::QueueClient};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub queue: QueueClient,
    pub admin_token: Option<String>,
    pub stats_cache_ttl_seconds: u64,
}
