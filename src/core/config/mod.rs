//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! The proxy is configured by a single TOML file naming the modules it serves
//! from source. The file is read once at startup.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (applied by the caller through [`Config::with_upstream`] and
//!    [`Config::with_cache_dir`])
//!
//! # Example
//!
//! ```no_run
//! use modgate::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("/etc/modgate.toml")).unwrap();
//! println!("Upstream: {}", config.upstream());
//! println!("Cache: {}", config.cache_dir().display());
//! ```

pub mod schema;

pub use schema::{FileConfig, ModuleRule, RepositoryPin};

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::core::paths::CachePaths;

/// Default upstream module proxy.
pub const DEFAULT_UPSTREAM: &str = "https://proxy.golang.org";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Resolved configuration.
///
/// Patterns are compiled and defaults applied, so consumers never see an
/// invalid value.
#[derive(Debug, Clone)]
pub struct Config {
    patterns: Vec<Regex>,
    repositories: Vec<RepositoryPin>,
    upstream: reqwest::Url,
    cache_dir: PathBuf,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_file(file)
    }

    /// Build a configuration from an already-parsed file.
    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        file.validate()?;

        let patterns = file
            .modules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern).map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "invalid module pattern '{}': {}",
                        rule.pattern, e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let upstream = parse_upstream(file.upstream.as_deref().unwrap_or(DEFAULT_UPSTREAM))?;

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .unwrap_or_else(CachePaths::default_base_dir);

        Ok(Self {
            patterns,
            repositories: file.repositories,
            upstream,
            cache_dir,
        })
    }

    /// Override the upstream URL.
    pub fn with_upstream(mut self, upstream: &str) -> Result<Self, ConfigError> {
        self.upstream = parse_upstream(upstream)?;
        Ok(self)
    }

    /// Override the cache directory.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Compiled module patterns, in file order.
    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// Pinned repository locations.
    pub fn repositories(&self) -> &[RepositoryPin] {
        &self.repositories
    }

    /// Upstream module proxy base URL.
    pub fn upstream(&self) -> &reqwest::Url {
        &self.upstream
    }

    /// Cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn parse_upstream(upstream: &str) -> Result<reqwest::Url, ConfigError> {
    schema::validate_upstream(upstream)?;
    reqwest::Url::parse(upstream)
        .map_err(|e| ConfigError::InvalidValue(format!("invalid upstream '{}': {}", upstream, e)))
}
