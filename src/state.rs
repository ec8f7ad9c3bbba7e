use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::redis::progress::RedisProgress;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub progress: RedisProgress,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, progress: RedisProgress) -> Self {
        Self {
            config,
            db,
            progress,
        }
    }
}
