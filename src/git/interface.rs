//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! modgate. Every clone, fetch, checkout and tag query flows through [`Git`],
//! which normalizes libgit2 failures into typed categories.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Directory holds no repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::Transfer`]: Clone or fetch against the remote failed
//! - [`GitError::Checkout`]: Working tree could not be switched
//!
//! # Example
//!
//! ```ignore
//! use modgate::git::{FetchSettings, Git};
//! use std::path::Path;
//!
//! let settings = FetchSettings::default();
//! let git = Git::open(Path::new("/var/cache/modgate/example.com/r"))?;
//! git.fetch_origin(&settings)?;
//! let branch = git.default_branch()?;
//! git.checkout_detached(&format!("refs/remotes/origin/{}", branch))?;
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Name of the only remote a cached working copy carries.
pub const ORIGIN: &str = "origin";

/// Refspecs used to refresh an existing working copy.
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// Branches tried, in order, when the remote does not advertise a HEAD.
const FALLBACK_BRANCHES: [&str; 2] = ["main", "master"];

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Directory holds no repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Clone or fetch failed.
    #[error("transfer from '{url}' failed: {message}")]
    Transfer {
        /// Remote URL
        url: String,
        /// Description of the failure
        message: String,
    },

    /// Checkout failed.
    #[error("checkout of {refname} failed: {message}")]
    Checkout {
        /// Ref being checked out
        refname: String,
        /// Description of the failure
        message: String,
    },

    /// Timestamp outside the representable range.
    #[error("invalid timestamp on {refname}: {seconds}")]
    InvalidTime {
        /// Ref the timestamp was read from
        refname: String,
        /// Raw seconds since the epoch
        seconds: i64,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn transfer(err: git2::Error, url: &str) -> Self {
        GitError::Transfer {
            url: url.to_string(),
            message: err.message().to_string(),
        }
    }

    fn checkout(err: git2::Error, refname: &str) -> Self {
        GitError::Checkout {
            refname: refname.to_string(),
            message: err.message().to_string(),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

/// Options applied to every network transfer.
#[derive(Debug, Clone, Default)]
pub struct FetchSettings {
    /// Sent as the `X-Client-Identity` header on HTTP transports
    pub client_identity: Option<String>,
}

impl FetchSettings {
    /// Settings that identify the proxy to remotes.
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            client_identity: Some(identity.into()),
        }
    }

    fn header(&self) -> Option<String> {
        self.client_identity
            .as_ref()
            .map(|identity| format!("X-Client-Identity: {}", identity))
    }
}

/// The main Git interface.
///
/// Wraps a `git2::Repository` with a working directory. The cache owns one
/// of these per repository root, only ever while it holds that root's lock.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Cloning
    // =========================================================================

    /// Open the repository whose working directory is `path`.
    ///
    /// Unlike discovery, this never walks up to a parent repository, so a
    /// half-created cache directory is reported as [`GitError::NotARepo`].
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// Clone `url` into `dir`, which must not exist or be empty.
    pub fn clone_into(url: &str, dir: &Path, settings: &FetchSettings) -> Result<Self, GitError> {
        let header = settings.header();
        let headers: Vec<&str> = header.iter().map(String::as_str).collect();

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.download_tags(git2::AutotagOption::All);
        fetch_options.custom_headers(&headers);

        let repo = git2::build::RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, dir)
            .map_err(|e| GitError::transfer(e, url))?;

        Ok(Self { repo })
    }

    /// Working directory of the repository.
    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    /// URL of the `origin` remote.
    pub fn origin_url(&self) -> Result<String, GitError> {
        let remote = self
            .repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, "remote origin"))?;
        Ok(remote.url().unwrap_or_default().to_string())
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Fetch every branch and tag from `origin`, pruning refs deleted there.
    pub fn fetch_origin(&self, settings: &FetchSettings) -> Result<(), GitError> {
        let mut remote = self
            .repo
            .find_remote(ORIGIN)
            .map_err(|e| GitError::from_git2(e, "remote origin"))?;
        let url = remote.url().unwrap_or_default().to_string();

        let header = settings.header();
        let headers: Vec<&str> = header.iter().map(String::as_str).collect();

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options
            .prune(git2::FetchPrune::On)
            .download_tags(git2::AutotagOption::All)
            .custom_headers(&headers);

        remote
            .fetch(&FETCH_REFSPECS, Some(&mut fetch_options), None)
            .map_err(|e| GitError::transfer(e, &url))
    }

    /// Name of the repository's default branch.
    ///
    /// Asks the remote for its symbolic HEAD first. When the remote cannot be
    /// reached or does not advertise one, falls back to the local
    /// `refs/remotes/origin/HEAD`, then to `main`, then to `master`.
    pub fn default_branch(&self) -> Result<String, GitError> {
        if let Some(branch) = self.advertised_head() {
            if self.remote_branch_exists(&branch) {
                return Ok(branch);
            }
        }

        if let Ok(reference) = self.repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = reference.symbolic_target() {
                if let Some(branch) = target.strip_prefix("refs/remotes/origin/") {
                    if self.remote_branch_exists(branch) {
                        return Ok(branch.to_string());
                    }
                }
            }
        }

        FALLBACK_BRANCHES
            .iter()
            .find(|branch| self.remote_branch_exists(branch))
            .map(|branch| branch.to_string())
            .ok_or_else(|| GitError::RefNotFound {
                refname: "refs/remotes/origin/HEAD".to_string(),
            })
    }

    /// Branch the remote advertises as HEAD, if it can be asked.
    fn advertised_head(&self) -> Option<String> {
        let mut remote = self.repo.find_remote(ORIGIN).ok()?;
        let connection = remote
            .connect_auth(git2::Direction::Fetch, None, None)
            .ok()?;
        let head = connection.default_branch().ok()?;
        head.as_str()?
            .strip_prefix("refs/heads/")
            .map(str::to_string)
    }

    fn remote_branch_exists(&self, branch: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .is_ok()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Force the working tree to the commit `refname` points at and detach
    /// HEAD there.
    ///
    /// Tracked changes are overwritten and untracked files removed, so the
    /// tree matches the commit exactly (ignored files are left alone).
    pub fn checkout_detached(&self, refname: &str) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_reference(refname)
            .and_then(|reference| reference.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, refname))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force().remove_untracked(true);

        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::checkout(e, refname))?;
        self.repo
            .set_head_detached(commit.id())
            .map_err(|e| GitError::checkout(e, refname))
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Names of every tag in the repository, without the `refs/tags/` prefix.
    pub fn tag_names(&self) -> Result<Vec<String>, GitError> {
        let names = self.repo.tag_names(None)?;
        Ok(names.iter().flatten().map(String::from).collect())
    }

    /// Timestamp of a tag, in UTC.
    ///
    /// An annotated tag yields its tagger time; a lightweight tag yields the
    /// author time of the commit it points at.
    pub fn tag_time(&self, tag: &str) -> Result<DateTime<Utc>, GitError> {
        let refname = format!("refs/tags/{}", tag);
        let reference = self
            .repo
            .find_reference(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        let target = reference.target().ok_or_else(|| GitError::RefNotFound {
            refname: refname.clone(),
        })?;
        let object = self
            .repo
            .find_object(target, None)
            .map_err(|e| GitError::from_git2(e, &target.to_string()))?;

        let tagger_time = object
            .as_tag()
            .and_then(|annotated| annotated.tagger())
            .map(|tagger| tagger.when());

        let when = match tagger_time {
            Some(when) => when,
            None => object
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, &refname))?
                .author()
                .when(),
        };

        DateTime::from_timestamp(when.seconds(), 0).ok_or(GitError::InvalidTime {
            refname,
            seconds: when.seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        #[test]
        fn error_display_formatting() {
            let err = GitError::RefNotFound {
                refname: "refs/tags/v1.0.0".to_string(),
            };
            assert_eq!(err.to_string(), "ref not found: refs/tags/v1.0.0");

            let err = GitError::Transfer {
                url: "https://example.com/r.git".to_string(),
                message: "connection refused".to_string(),
            };
            assert!(err.to_string().contains("https://example.com/r.git"));
            assert!(err.to_string().contains("connection refused"));
        }

        #[test]
        fn not_found_with_ref_context_is_ref_not_found() {
            let raw = git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Reference,
                "missing",
            );
            assert!(matches!(
                GitError::from_git2(raw, "refs/tags/v9.9.9"),
                GitError::RefNotFound { .. }
            ));
        }

        #[test]
        fn other_codes_are_internal() {
            let raw = git2::Error::new(
                git2::ErrorCode::GenericError,
                git2::ErrorClass::Net,
                "boom",
            );
            let err = GitError::from_git2(raw, "fetch");
            assert!(matches!(err, GitError::Internal { .. }));
            assert_eq!(err.to_string(), "git error: fetch: boom");
        }
    }

    mod fetch_settings {
        use super::*;

        #[test]
        fn default_sends_no_header() {
            assert_eq!(FetchSettings::default().header(), None);
        }

        #[test]
        fn identity_becomes_header() {
            let settings = FetchSettings::with_identity("modgate/0.1.0");
            assert_eq!(
                settings.header().as_deref(),
                Some("X-Client-Identity: modgate/0.1.0")
            );
        }
    }

    mod open {
        use super::*;

        #[test]
        fn empty_directory_is_not_a_repo() {
            let dir = tempfile::TempDir::new().unwrap();
            assert!(matches!(
                Git::open(dir.path()),
                Err(GitError::NotARepo { .. })
            ));
        }
    }
}
