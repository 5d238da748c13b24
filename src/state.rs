use std::sync::Arc;

use sqlx::SqlitePool;

use crate::cache::ContentStore;
use crate::services::RefreshService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<ContentStore>,
    pub refresh: Arc<RefreshService>,
}
