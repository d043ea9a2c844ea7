//! proxy::error
//!
//! Errors surfaced by the module proxy facade.
//!
//! Every variant carries the operation and module path it failed on, so a
//! single log line is enough to place the failure. [`ProxyError::kind`]
//! collapses the variants into the categories the HTTP layer maps to status
//! codes.

use thiserror::Error;

use crate::cache::CacheError;
use crate::module::ArchiveError;

/// Error category, independent of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Resolution,
    UnsupportedVersion,
    Fetch,
    Archive,
    Internal,
}

/// Errors from module proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The module's repository could not be located.
    #[error("{op} {module}: {message}")]
    Resolution {
        op: &'static str,
        module: String,
        message: String,
    },

    /// Cloning or fetching the repository failed.
    #[error("{op} {module}: {message}")]
    Fetch {
        op: &'static str,
        module: String,
        message: String,
    },

    /// Module or version does not exist.
    #[error("{op} {module}: not found")]
    NotFound { op: &'static str, module: String },

    /// Version names a commit rather than a tag.
    #[error("{op} {module}: unsupported version {version}")]
    UnsupportedVersion {
        op: &'static str,
        module: String,
        version: String,
    },

    /// Building an archive or reading a descriptor failed.
    #[error("{op} {module}: {message}")]
    Archive {
        op: &'static str,
        module: String,
        message: String,
    },

    /// Anything else: lock contention, task failure, filesystem errors.
    #[error("{op} {module}: {message}")]
    Internal {
        op: &'static str,
        module: String,
        message: String,
    },
}

impl ProxyError {
    /// Category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Resolution { .. } => ErrorKind::Resolution,
            ProxyError::Fetch { .. } => ErrorKind::Fetch,
            ProxyError::NotFound { .. } => ErrorKind::NotFound,
            ProxyError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            ProxyError::Archive { .. } => ErrorKind::Archive,
            ProxyError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(op: &'static str, module: &str) -> Self {
        ProxyError::NotFound {
            op,
            module: module.to_string(),
        }
    }

    pub(crate) fn internal(op: &'static str, module: &str, err: impl std::fmt::Display) -> Self {
        ProxyError::Internal {
            op,
            module: module.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn from_cache(op: &'static str, module: &str, err: CacheError) -> Self {
        let module = module.to_string();
        let message = err.to_string();
        match err {
            CacheError::Resolve(_) => ProxyError::Resolution {
                op,
                module,
                message,
            },
            CacheError::Git { .. } => ProxyError::Fetch {
                op,
                module,
                message,
            },
            CacheError::Lock(_) | CacheError::Io { .. } | CacheError::Task(_) => {
                ProxyError::Internal {
                    op,
                    module,
                    message,
                }
            }
        }
    }

    pub(crate) fn from_archive(op: &'static str, module: &str, err: ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound { .. } => Self::not_found(op, module),
            ArchiveError::Unsupported { version, .. } => ProxyError::UnsupportedVersion {
                op,
                module: module.to_string(),
                version,
            },
            other => ProxyError::Archive {
                op,
                module: module.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LockError, ResolveError};
    use crate::git::GitError;

    #[test]
    fn cache_errors_map_to_kinds() {
        let resolve = CacheError::Resolve(ResolveError::NotFound {
            path: "example.com/r".to_string(),
            reason: "no pin".to_string(),
        });
        assert_eq!(
            ProxyError::from_cache("list", "example.com/r", resolve).kind(),
            ErrorKind::Resolution
        );

        let git = CacheError::Git {
            root: "example.com/r".to_string(),
            source: GitError::Transfer {
                url: "https://h/r".to_string(),
                message: "refused".to_string(),
            },
        };
        assert_eq!(
            ProxyError::from_cache("list", "example.com/r", git).kind(),
            ErrorKind::Fetch
        );

        let lock = CacheError::Lock(LockError::AlreadyLocked {
            root: "example.com/r".to_string(),
        });
        assert_eq!(
            ProxyError::from_cache("list", "example.com/r", lock).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn archive_errors_map_to_kinds() {
        let unsupported = ArchiveError::Unsupported {
            module: "example.com/r".to_string(),
            version: "abcdef1".to_string(),
        };
        let err = ProxyError::from_archive("zip", "example.com/r", unsupported);
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        assert_eq!(err.to_string(), "zip example.com/r: unsupported version abcdef1");

        let missing = ArchiveError::NotFound {
            module: "example.com/r".to_string(),
            version: "v9.0.0".to_string(),
        };
        assert_eq!(
            ProxyError::from_archive("mod", "example.com/r", missing).kind(),
            ErrorKind::NotFound
        );

        let checkout = ArchiveError::Git(GitError::Checkout {
            refname: "refs/tags/v1.0.0".to_string(),
            message: "conflict".to_string(),
        });
        assert_eq!(
            ProxyError::from_archive("zip", "example.com/r", checkout).kind(),
            ErrorKind::Archive
        );
    }

    #[test]
    fn display_names_operation_and_module() {
        let err = ProxyError::not_found("info", "example.com/r");
        assert_eq!(err.to_string(), "info example.com/r: not found");
    }
}
