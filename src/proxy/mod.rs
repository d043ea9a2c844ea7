//! proxy
//!
//! The module proxy facade.
//!
//! # Architecture
//!
//! [`ModuleProxy`] answers the five protocol questions (versions, info,
//! latest, descriptor, archive) for modules matching a configured pattern.
//! Each operation:
//!
//! 1. Fetches a fresh [`WorkingCopy`] from the [`RepositoryCache`], which
//!    holds the repository root's lock
//! 2. Moves the copy onto the blocking pool, discovers the [`ModuleTree`] and
//!    does its git and filesystem work there
//! 3. Drops the copy, releasing the lock
//!
//! Operations against different repositories run concurrently. Operations
//! against the same repository serialize on its lock.
//!
//! # Example
//!
//! ```ignore
//! use modgate::proxy::ModuleProxy;
//!
//! let proxy = ModuleProxy::from_config(&config)?;
//! if proxy.is_proxy("go.example.com/lib") {
//!     let versions = proxy.versions("go.example.com/lib").await?;
//! }
//! ```

mod error;

pub use error::{ErrorKind, ProxyError};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::resolver::{DiscoveryResolver, StaticResolver};
use crate::cache::{RepositoryCache, WorkingCopy};
use crate::core::config::Config;
use crate::core::paths::CachePaths;
use crate::git::FetchSettings;
use crate::module::{archive, ModuleTree, ModuleVersion};
use crate::CLIENT_IDENTITY;

/// Version metadata returned by the info and latest endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Info {
    pub version: String,
    #[serde(with = "zero_time")]
    pub time: Option<DateTime<Utc>>,
}

impl From<&ModuleVersion> for Info {
    fn from(version: &ModuleVersion) -> Self {
        Self {
            version: version.version.clone(),
            time: version.time,
        }
    }
}

/// Timestamps with the zero time standing in for "unknown".
mod zero_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        time: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == ZERO_TIME {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|time| Some(time.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

pub use zero_time::ZERO_TIME;

/// Module proxy serving pattern-matched modules from source.
pub struct ModuleProxy {
    cache: RepositoryCache,
    patterns: Vec<Regex>,
}

impl std::fmt::Debug for ModuleProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleProxy")
            .field("cache", &self.cache)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl ModuleProxy {
    /// Create a proxy over `cache` serving modules matching any of `patterns`.
    pub fn new(cache: RepositoryCache, patterns: Vec<Regex>) -> Self {
        Self { cache, patterns }
    }

    /// Build the proxy described by a configuration.
    ///
    /// Repository pins are consulted first and discovery handles the rest.
    pub fn from_config(config: &Config) -> Result<Self, ProxyError> {
        let discovery = DiscoveryResolver::new(CLIENT_IDENTITY)
            .map_err(|e| ProxyError::internal("discovery client", "", e))?;
        let discovery = Arc::new(discovery);
        let resolver = StaticResolver::new(config.repositories().to_vec()).with_fallback(discovery);
        let cache = RepositoryCache::new(
            CachePaths::new(config.cache_dir()),
            Arc::new(resolver),
            FetchSettings::with_identity(CLIENT_IDENTITY),
        );
        Ok(Self::new(cache, config.patterns().to_vec()))
    }

    /// Whether `module` is served from source rather than upstream.
    pub fn is_proxy(&self, module: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(module))
    }

    /// Every version of a module, ascending.
    pub async fn versions(&self, module: &str) -> Result<Vec<String>, ProxyError> {
        const OP: &str = "list";
        let path = module.to_string();
        self.with_tree(OP, module, move |_, tree| {
            let found = tree
                .module(&path)
                .ok_or_else(|| ProxyError::not_found(OP, &path))?;
            Ok(found.versions.iter().map(|v| v.version.clone()).collect())
        })
        .await
    }

    /// Metadata for one version.
    pub async fn get_info(&self, module: &str, version: &str) -> Result<Info, ProxyError> {
        const OP: &str = "info";
        let path = module.to_string();
        let version = version.to_string();
        self.with_tree(OP, module, move |_, tree| {
            let found = archive::locate(tree, &path, &version)
                .map_err(|e| ProxyError::from_archive(OP, &path, e))?;
            found
                .version(&version)
                .map(Info::from)
                .ok_or_else(|| ProxyError::not_found(OP, &path))
        })
        .await
    }

    /// Metadata for the highest version.
    pub async fn get_latest_version(&self, module: &str) -> Result<Info, ProxyError> {
        const OP: &str = "latest";
        let path = module.to_string();
        self.with_tree(OP, module, move |_, tree| {
            tree.module(&path)
                .and_then(|found| found.latest())
                .map(Info::from)
                .ok_or_else(|| ProxyError::not_found(OP, &path))
        })
        .await
    }

    /// Raw `go.mod` of one version.
    pub async fn get_descriptor(&self, module: &str, version: &str) -> Result<Vec<u8>, ProxyError> {
        const OP: &str = "mod";
        let path = module.to_string();
        let version = version.to_string();
        self.with_tree(OP, module, move |copy, tree| {
            archive::read_descriptor(copy, tree, &path, &version)
                .map_err(|e| ProxyError::from_archive(OP, &path, e))
        })
        .await
    }

    /// Zip archive of one version.
    pub async fn get_archive(&self, module: &str, version: &str) -> Result<Vec<u8>, ProxyError> {
        const OP: &str = "zip";
        let path = module.to_string();
        let version = version.to_string();
        self.with_tree(OP, module, move |copy, tree| {
            archive::build_archive(copy, tree, &path, &version)
                .map_err(|e| ProxyError::from_archive(OP, &path, e))
        })
        .await
    }

    /// Fetch the module's repository and run `f` against its tree on the
    /// blocking pool.
    ///
    /// The working copy (and with it the root's lock) moves into the
    /// blocking task, so the lock is held until `f` returns even if the
    /// caller stops waiting.
    async fn with_tree<T, F>(&self, op: &'static str, module: &str, f: F) -> Result<T, ProxyError>
    where
        T: Send + 'static,
        F: FnOnce(&WorkingCopy, &ModuleTree) -> Result<T, ProxyError> + Send + 'static,
    {
        let copy = self
            .cache
            .fetch(module)
            .await
            .map_err(|e| ProxyError::from_cache(op, module, e))?;

        let path = module.to_string();
        tokio::task::spawn_blocking(move || {
            let tree = ModuleTree::load(&copy).map_err(|e| ProxyError::internal(op, &path, e))?;
            f(&copy, &tree)
        })
        .await
        .map_err(|e| ProxyError::internal(op, module, e))?
    }
}
