use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Everything a refresher needs to repopulate one cache generation: the
/// course identity, where to fetch from, and the staging paths to fill.
/// The paths always point inside a staging tree; the live cache directory
/// is swapped in by the caller only after the refresher succeeds.
#[derive(Debug, Clone)]
pub struct RefreshSpec {
    pub course_name: String,
    pub source_url: String,
    pub clone_path: PathBuf,
    pub solution_path: PathBuf,
    pub stub_path: PathBuf,
    pub stub_zip_path: PathBuf,
    pub solution_zip_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum RefreshFailure {
    #[error("fetching course repository failed: {0}")]
    Fetch(String),

    #[error("preparing course artifacts failed: {0}")]
    Prepare(String),
}

/// Repopulates a course's cached artifacts from its source repository.
/// Implementations own everything between "here are empty staging
/// directories" and "they are fully populated"; partial output is fine on
/// failure because the staging tree is discarded wholesale.
#[async_trait]
pub trait CourseRefresher: Send + Sync {
    async fn refresh(&self, spec: &RefreshSpec) -> Result<(), RefreshFailure>;
}

/// Clones the course repository into the staging clone directory. Stub,
/// solution and zip materialization is left to richer refreshers; this one
/// covers deployments where the repository itself is the content.
pub struct GitCloneRefresher;

#[async_trait]
impl CourseRefresher for GitCloneRefresher {
    async fn refresh(&self, spec: &RefreshSpec) -> Result<(), RefreshFailure> {
        info!("cloning {} for course {}", spec.source_url, spec.course_name);
        let output = tokio::process::Command::new("git")
            .arg("clone")
            .arg(&spec.source_url)
            .arg(&spec.clone_path)
            .output()
            .await
            .map_err(|e| RefreshFailure::Fetch(format!("could not run git: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefreshFailure::Fetch(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Succeeds without touching anything. Stands in for a real refresher in
/// tests, the way a no-op client stands in for an external service.
pub struct NoopRefresher;

#[async_trait]
impl CourseRefresher for NoopRefresher {
    async fn refresh(&self, _spec: &RefreshSpec) -> Result<(), RefreshFailure> {
        Ok(())
    }
}
