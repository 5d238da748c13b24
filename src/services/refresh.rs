use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{CachePaths, ContentStore};
use crate::db::repository;
use crate::error::AppError;
use crate::models::Course;
use crate::refresher::{CourseRefresher, RefreshSpec};

/// Orchestrates a course refresh: stages the next cache generation, runs
/// the refresher collaborator against it, and swaps it in. Refreshes of the
/// same course are serialized by an advisory per-course-name lock; the live
/// cache is only ever replaced by a fully populated tree.
pub struct RefreshService {
    db: SqlitePool,
    store: Arc<ContentStore>,
    refresher: Arc<dyn CourseRefresher>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The cache was repopulated and the course now serves the new
    /// generation.
    Refreshed {
        cache_version: i64,
        revision: Option<String>,
    },
    /// The refresher reported a failure; the previous cache generation is
    /// untouched.
    Failed { error: String },
    /// The caller's deadline expired; the previous cache generation is
    /// untouched.
    Cancelled,
}

impl RefreshService {
    pub fn new(db: SqlitePool, store: Arc<ContentStore>, refresher: Arc<dyn CourseRefresher>) -> Self {
        Self {
            db,
            store,
            refresher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn refresh_course(
        &self,
        course: &Course,
        deadline: Option<Duration>,
    ) -> Result<RefreshOutcome, AppError> {
        let lock = self.lock_for(&course.name).await;
        let _guard = lock.lock().await;

        // Re-read under the lock: an earlier refresh may have advanced the
        // version since the caller loaded its snapshot.
        let course = repository::find_course(&self.db, course.id)
            .await?
            .ok_or(AppError::NotFound)?;

        // The next generation gets its own directory; the current one stays
        // live until the swap below.
        let next_version = course.cache_version + 1;
        let paths = self.store.paths(&course.name, next_version)?;
        let staging = self.store.prepare_staging(&paths).await?;
        let spec = RefreshSpec {
            course_name: course.name.clone(),
            source_url: course.source_url.clone(),
            clone_path: staging.clone_path(),
            solution_path: staging.solution_path(),
            stub_path: staging.stub_path(),
            stub_zip_path: staging.stub_zip_path(),
            solution_zip_path: staging.solution_zip_path(),
        };

        info!("refreshing course {} into cache generation {}", course.name, next_version);
        let run = self.refresher.refresh(&spec);
        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("refresh of course {} hit its deadline, discarding staging", course.name);
                    self.discard(&paths).await;
                    return Ok(RefreshOutcome::Cancelled);
                }
            },
            None => run.await,
        };

        match result {
            Ok(()) => {
                self.store.promote_staging(&paths).await?;
                repository::bump_cache_version(&self.db, course.id, next_version).await?;
                let revision = self.store.read_head_revision(&paths.clone_path()).await;
                info!("course {} refreshed at generation {}", course.name, next_version);
                Ok(RefreshOutcome::Refreshed {
                    cache_version: next_version,
                    revision,
                })
            }
            Err(failure) => {
                warn!("refresh of course {} failed: {}", course.name, failure);
                self.discard(&paths).await;
                Ok(RefreshOutcome::Failed {
                    error: failure.to_string(),
                })
            }
        }
    }

    async fn discard(&self, paths: &CachePaths) {
        if let Err(e) = self.store.discard_staging(paths).await {
            warn!("could not discard staging directory: {}", e);
        }
    }

    async fn lock_for(&self, course_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(course_name.to_string()).or_default().clone()
    }
}
