//! core::paths
//!
//! Centralized path routing for cache storage locations.
//!
//! # Storage Layout
//!
//! All data lives under the configured cache directory:
//! - `<cache_dir>/<case-encoded root>@git/` - One git working copy per repository root
//! - `<cache_dir>/.locks/<digest>.lock` - One lock file per repository root
//!
//! **Hard rule:** No code outside this module joins import paths onto the
//! cache directory. Import paths are validated by the resolver before they get
//! here, so a root can never escape the cache directory.
//!
//! The `@git` suffix on the last element keeps nested roots apart: module paths
//! never contain `@`, so `example.com/a@git` and `example.com/a/b@git` can never
//! be inside one another. Roots are case-encoded (`Foo` becomes `!foo`) so
//! roots differing only by case stay apart on case-insensitive filesystems.
//!
//! # Example
//!
//! ```
//! use modgate::core::paths::CachePaths;
//! use std::path::PathBuf;
//!
//! let paths = CachePaths::new("/var/cache/modgate");
//!
//! assert_eq!(
//!     paths.repo_dir("github.com/acme/mono"),
//!     PathBuf::from("/var/cache/modgate/github.com/acme/mono@git")
//! );
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::types::encode_case;

/// Name of the directory holding per-root lock files.
const LOCKS_DIR: &str = ".locks";

/// Suffix appended to a root's last element to name its working copy.
const REPO_SUFFIX: &str = "@git";

/// Centralized path routing for cache storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    /// Base cache directory.
    pub base_dir: PathBuf,
}

impl CachePaths {
    /// Create paths rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Default cache directory: `<platform cache dir>/modgate`.
    ///
    /// Falls back to `./.modgate-cache` when the platform has no cache dir.
    pub fn default_base_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("modgate"))
            .unwrap_or_else(|| PathBuf::from(".modgate-cache"))
    }

    /// Working copy directory for a repository root.
    pub fn repo_dir(&self, root: &str) -> PathBuf {
        let dir = encode_case(root)
            .split('/')
            .fold(self.base_dir.clone(), |dir, element| dir.join(element));
        let mut name = dir.into_os_string();
        name.push(REPO_SUFFIX);
        PathBuf::from(name)
    }

    /// Directory holding lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.base_dir.join(LOCKS_DIR)
    }

    /// Lock file for a repository root.
    ///
    /// The file name is a digest of the root so that nested roots
    /// (`example.com/a` and `example.com/a/b`) never share a lock path.
    pub fn lock_path(&self, root: &str) -> PathBuf {
        let digest = Sha256::digest(root.as_bytes());
        let name = hex::encode(&digest[..8]);
        self.locks_dir().join(format!("{}.lock", name))
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
