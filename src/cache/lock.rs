//! cache::lock
//!
//! Exclusive per-root locks for cached working copies.
//!
//! # Architecture
//!
//! A working copy is shared by every module and version served from its
//! repository, and fetch, checkout and archive walks all mutate or read its
//! tree. Two layers keep those operations apart:
//!
//! - [`RootLocks`]: an in-process async mutex per root. Requests for the same
//!   root queue here; requests for different roots never contend.
//! - [`RepoLock`]: an OS-level exclusive lock file per root via `fs2`. It
//!   detects a second process pointed at the same cache directory and fails
//!   fast instead of letting two processes share a tree.
//!
//! # Storage
//!
//! - `<cache_dir>/.locks/<digest>.lock` - Lock file per repository root
//!
//! # Invariants
//!
//! - [`RootGuard`] holds both layers; dropping it releases both (RAII)
//! - The in-process mutex is always taken before the lock file, so the file
//!   lock never sees contention from this process
//! - Lock file acquisition is non-blocking (fails fast if locked)

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::core::paths::CachePaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("repository root '{root}' is locked by another process")]
    AlreadyLocked {
        /// The contended root
        root: String,
    },

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// An exclusive OS-level lock on one repository root.
///
/// The lock is automatically released when this guard is dropped.
#[derive(Debug)]
pub struct RepoLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    file: Option<File>,
}

impl RepoLock {
    /// Attempt to acquire the lock file for `root`.
    ///
    /// Non-blocking: if another process holds the lock this returns
    /// [`LockError::AlreadyLocked`] immediately.
    pub fn acquire(paths: &CachePaths, root: &str) -> Result<Self, LockError> {
        let locks_dir = paths.locks_dir();
        fs::create_dir_all(&locks_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", locks_dir.display(), e))
        })?;

        let path = paths.lock_path(root);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked {
                root: root.to_string(),
            }),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // Best-effort release on drop
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

/// Registry of in-process mutexes, one per repository root.
///
/// Entries are created on first use. An entry nobody holds or waits on is
/// dropped the next time the registry is consulted, so the map tracks the
/// roots in use rather than every root ever requested.
#[derive(Debug, Default)]
pub struct RootLocks {
    roots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RootLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, root: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        roots
            .entry(root.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `root`, then take its lock file.
    ///
    /// Cancelling the returned future while it waits leaves nothing held.
    pub async fn acquire(&self, paths: &CachePaths, root: &str) -> Result<RootGuard, LockError> {
        let process = self.mutex_for(root).lock_owned().await;
        let file = RepoLock::acquire(paths, root)?;

        Ok(RootGuard {
            root: root.to_string(),
            file,
            _process: process,
        })
    }
}

/// Exclusive access to one repository root, released on drop.
///
/// Fields drop in declaration order: the lock file is released before the
/// mutex admits the next waiter.
#[derive(Debug)]
pub struct RootGuard {
    root: String,
    file: RepoLock,
    _process: OwnedMutexGuard<()>,
}

impl RootGuard {
    /// The root this guard protects.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Check the lock file is still held.
    pub fn is_held(&self) -> bool {
        self.file.is_held()
    }
}
