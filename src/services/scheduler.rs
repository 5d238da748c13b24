use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::repository::{self, CourseFilter};
use crate::services::refresh::{RefreshOutcome, RefreshService};

/// Periodically refreshes every ongoing course so caches track their
/// source repositories without manual triggering.
pub struct RefreshScheduler {
    db: SqlitePool,
    refresh: Arc<RefreshService>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(db: SqlitePool, refresh: Arc<RefreshService>, interval_secs: u64) -> Self {
        Self {
            db,
            refresh,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Runs forever. A failed round is logged and the loop continues.
    pub async fn start(self) {
        info!("starting refresh scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.run_round().await {
                Ok((refreshed, failed)) => {
                    info!("scheduled refresh round done: {} refreshed, {} failed", refreshed, failed);
                }
                Err(e) => {
                    tracing::warn!("scheduled refresh round failed: {:?}", e);
                }
            }
        }
    }

    async fn run_round(&self) -> Result<(usize, usize), crate::error::AppError> {
        let courses = repository::fetch_courses(&self.db, CourseFilter::Ongoing, Utc::now()).await?;
        let mut refreshed = 0;
        let mut failed = 0;
        for course in courses.iter().filter(|c| !c.hidden) {
            match self.refresh.refresh_course(course, Some(self.interval)).await? {
                RefreshOutcome::Refreshed { .. } => refreshed += 1,
                RefreshOutcome::Failed { .. } | RefreshOutcome::Cancelled => failed += 1,
            }
        }
        Ok((refreshed, failed))
    }
}
