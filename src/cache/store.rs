use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

use crate::cache::paths::{CachePathError, CachePaths};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Path(#[from] CachePathError),

    #[error("cache unavailable: {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(op: &'static str, path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Owns all filesystem side effects of the course cache. The cache root is
/// injected at construction; nothing here reads ambient configuration.
pub struct ContentStore {
    cache_root: PathBuf,
}

impl ContentStore {
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn paths(&self, course_name: &str, cache_version: i64) -> Result<CachePaths, CacheError> {
        Ok(CachePaths::new(&self.cache_root, course_name, cache_version)?)
    }

    /// Reads the current HEAD revision of the clone, if there is one.
    /// Probe failures of any kind (no clone yet, not a repository, no
    /// commits, git unavailable) resolve to `None`, never to an error.
    pub async fn read_head_revision(&self, clone_path: &Path) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "HEAD"])
            .current_dir(clone_path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let revision = String::from_utf8(output.stdout).ok()?;
        let revision = revision.trim();
        if revision.is_empty() {
            None
        } else {
            Some(revision.to_string())
        }
    }

    /// Removes a course's cache generation and any staging or retired
    /// leftovers next to it. Idempotent: an absent tree is a no-op.
    pub async fn delete_cache(&self, paths: &CachePaths) -> Result<(), CacheError> {
        remove_tree(paths.cache_path()).await?;
        remove_tree(paths.staging().cache_path()).await?;
        remove_tree(&paths.retired()).await
    }

    /// Prepares an empty staging tree (with the standard leaf directories)
    /// for the given cache generation, discarding any stale one first.
    pub async fn prepare_staging(&self, paths: &CachePaths) -> Result<CachePaths, CacheError> {
        let staging = paths.staging();
        remove_tree(staging.cache_path()).await?;
        for dir in [
            staging.clone_path(),
            staging.solution_path(),
            staging.stub_path(),
            staging.stub_zip_path(),
            staging.solution_zip_path(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_err("create", &dir, e))?;
        }
        Ok(staging)
    }

    /// Swaps a fully populated staging tree into place. The live directory
    /// is renamed aside, the staging tree renamed in, and the old tree
    /// removed, so readers observe either the previous generation or the
    /// new one, never a half-written directory.
    pub async fn promote_staging(&self, paths: &CachePaths) -> Result<(), CacheError> {
        let live = paths.cache_path();
        let staging = paths.staging();
        let retired = paths.retired();

        remove_tree(&retired).await?;
        match tokio::fs::rename(live, &retired).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err("rename", live, e)),
        }
        if let Err(e) = tokio::fs::rename(staging.cache_path(), live).await {
            // Put the previous generation back before reporting.
            if let Err(restore) = tokio::fs::rename(&retired, live).await {
                if restore.kind() != ErrorKind::NotFound {
                    warn!("could not restore previous cache at {}: {}", live.display(), restore);
                }
            }
            return Err(io_err("rename", staging.cache_path(), e));
        }
        remove_tree(&retired).await
    }

    /// Throws away a staging tree, leaving the live generation untouched.
    pub async fn discard_staging(&self, paths: &CachePaths) -> Result<(), CacheError> {
        remove_tree(paths.staging().cache_path()).await
    }
}

async fn remove_tree(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err("remove", path, e)),
    }
}
