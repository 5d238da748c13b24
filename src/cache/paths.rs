use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CachePathError {
    #[error("course name {0:?} cannot be used as a cache directory name")]
    UnsafeName(String),
}

/// Resolves the on-disk cache layout for one generation of a course's
/// derived artifacts. Purely computational; the identity of the directory
/// is `(course name, cache version)`, so bumping the version or renaming
/// the course points at a fresh tree and orphans the old one.
///
/// Layout: `<root>/course/{name}-{version}/{clone,solution,stub,stub_zip,solution_zip}`.
#[derive(Debug, Clone)]
pub struct CachePaths {
    base: PathBuf,
}

impl CachePaths {
    pub fn new(cache_root: &Path, course_name: &str, cache_version: i64) -> Result<Self, CachePathError> {
        validate_name(course_name)?;
        let base = cache_root
            .join("course")
            .join(format!("{course_name}-{cache_version}"));
        Ok(Self { base })
    }

    pub fn cache_path(&self) -> &Path {
        &self.base
    }

    /// Working copy of the course's source repository.
    pub fn clone_path(&self) -> PathBuf {
        self.base.join("clone")
    }

    pub fn solution_path(&self) -> PathBuf {
        self.base.join("solution")
    }

    pub fn stub_path(&self) -> PathBuf {
        self.base.join("stub")
    }

    pub fn stub_zip_path(&self) -> PathBuf {
        self.base.join("stub_zip")
    }

    pub fn solution_zip_path(&self) -> PathBuf {
        self.base.join("solution_zip")
    }

    /// Sibling directory a refresh populates before it is swapped in.
    /// Readers of the live layout never see it.
    pub fn staging(&self) -> CachePaths {
        CachePaths {
            base: sibling(&self.base, ".staging"),
        }
    }

    /// Where the previous live tree is parked for the instant of a swap.
    pub(crate) fn retired(&self) -> PathBuf {
        sibling(&self.base, ".old")
    }
}

fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    base.with_file_name(name)
}

/// Course names become path components verbatim, so anything that could
/// escape the cache root or collide with the `-{version}` suffix handling
/// is rejected. Name validation at save time already forbids whitespace;
/// this guards the filesystem layer independently.
fn validate_name(name: &str) -> Result<(), CachePathError> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| {
            c.is_whitespace() || c == '/' || c == '\\' || c == '\0'
        });
    if unsafe_name {
        return Err(CachePathError::UnsafeName(name.to_string()));
    }
    Ok(())
}
