//! cache
//!
//! Local working copies of the repositories modules are served from.
//!
//! # Architecture
//!
//! [`RepositoryCache::fetch`] is the only way to obtain a [`WorkingCopy`]:
//!
//! 1. Resolve the import path to a repository root ([`resolver`])
//! 2. Take the root's exclusive lock ([`lock`])
//! 3. On the blocking pool, clone the repository on first use or fetch and
//!    prune an existing copy, then check out the default branch tip
//!
//! The returned [`WorkingCopy`] owns the root's lock until it is dropped, so
//! whatever the caller does with the tree (module discovery, tag checkout,
//! archive walks) is serialized against every other request for that root.
//!
//! # Invariants
//!
//! - One working copy per root at `<cache_dir>/<root>@git`
//! - A failed initial clone leaves no directory behind
//! - Nothing is retried; each failure is reported once with its category

pub mod lock;
pub mod resolver;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::paths::CachePaths;
use crate::git::{FetchSettings, Git, GitError};

pub use lock::{LockError, RootGuard, RootLocks};
pub use resolver::{RepoSource, ResolveError, RootResolver};

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The import path could not be mapped to a repository.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The root's lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Clone, fetch or checkout failed.
    #[error("repository '{root}': {source}")]
    Git {
        root: String,
        #[source]
        source: GitError,
    },

    /// Cache directory could not be prepared.
    #[error("cache directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking task panicked or was cancelled.
    #[error("cache task failed: {0}")]
    Task(String),
}

/// A locked, up-to-date working copy of one repository root.
///
/// Holds the root's lock for as long as it lives.
#[derive(Debug)]
pub struct WorkingCopy {
    source: RepoSource,
    dir: PathBuf,
    default_branch: String,
    git: Git,
    _guard: RootGuard,
}

impl WorkingCopy {
    /// Import path of the repository root.
    pub fn root(&self) -> &str {
        &self.source.root
    }

    /// Where the repository was fetched from.
    pub fn source(&self) -> &RepoSource {
        &self.source
    }

    /// Working tree directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Branch checked out after the last fetch.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Git handle for the working copy.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Check out a tag (detached, forced).
    pub fn checkout_tag(&self, tag: &str) -> Result<(), GitError> {
        self.git.checkout_detached(&format!("refs/tags/{}", tag))
    }
}

/// Cache of repository working copies.
pub struct RepositoryCache {
    paths: CachePaths,
    resolver: Arc<dyn RootResolver>,
    locks: RootLocks,
    settings: FetchSettings,
}

impl std::fmt::Debug for RepositoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("paths", &self.paths)
            .field("settings", &self.settings)
            .finish()
    }
}

impl RepositoryCache {
    /// Create a cache rooted at `paths`.
    pub fn new(paths: CachePaths, resolver: Arc<dyn RootResolver>, settings: FetchSettings) -> Self {
        Self {
            paths,
            resolver,
            locks: RootLocks::new(),
            settings,
        }
    }

    /// Storage paths used by this cache.
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Resolve `import_path`, lock its root and bring the working copy up to
    /// date.
    ///
    /// Dropping the returned future before the blocking section starts
    /// abandons the request and releases the lock. Once the clone or fetch
    /// has started it runs to completion on the blocking pool.
    pub async fn fetch(&self, import_path: &str) -> Result<WorkingCopy, CacheError> {
        let source = self.resolver.resolve(import_path).await?;
        let guard = self.locks.acquire(&self.paths, &source.root).await?;

        let dir = self.paths.repo_dir(&source.root);
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || sync_working_copy(source, dir, &settings, guard))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

/// Clone or update the working copy and check out the default branch.
fn sync_working_copy(
    source: RepoSource,
    dir: PathBuf,
    settings: &FetchSettings,
    guard: RootGuard,
) -> Result<WorkingCopy, CacheError> {
    let git_error = |source_err: GitError| CacheError::Git {
        root: source.root.clone(),
        source: source_err,
    };

    let git = if dir.join(".git").exists() {
        let git = Git::open(&dir).map_err(git_error)?;
        if git.origin_url().map_err(git_error)? != source.url {
            tracing::warn!(
                root = %source.root,
                url = %source.url,
                "cached working copy was cloned from a different url"
            );
        }

        tracing::debug!(root = %source.root, "fetching");
        git.fetch_origin(settings).map_err(git_error)?;
        git
    } else {
        clone_fresh(&source, &dir, settings).map_err(|e| match e {
            CloneError::Io(path, err) => CacheError::Io { path, source: err },
            CloneError::Git(err) => git_error(err),
        })?
    };

    let default_branch = git.default_branch().map_err(git_error)?;
    git.checkout_detached(&format!("refs/remotes/origin/{}", default_branch))
        .map_err(git_error)?;

    tracing::debug!(root = %source.root, branch = %default_branch, "working copy ready");

    Ok(WorkingCopy {
        source,
        dir,
        default_branch,
        git,
        _guard: guard,
    })
}

enum CloneError {
    Io(PathBuf, std::io::Error),
    Git(GitError),
}

fn clone_fresh(source: &RepoSource, dir: &Path, settings: &FetchSettings) -> Result<Git, CloneError> {
    // Leftovers of an interrupted clone are not a repository.
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| CloneError::Io(dir.to_path_buf(), e))?;
    }
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent).map_err(|e| CloneError::Io(parent.to_path_buf(), e))?;
    }

    tracing::info!(root = %source.root, url = %source.url, "cloning");

    match Git::clone_into(&source.url, dir, settings) {
        Ok(git) => Ok(git),
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(dir) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %cleanup, "failed to remove partial clone");
                }
            }
            Err(CloneError::Git(e))
        }
    }
}
