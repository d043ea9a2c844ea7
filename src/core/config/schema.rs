//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Validation
//!
//! Config values are validated after parsing: every module pattern must
//! compile as a regular expression, repository pins must name a prefix and a
//! URL, and the upstream must be an http(s) URL.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::ModulePath;

/// Proxy configuration file.
///
/// # Example
///
/// ```toml
/// upstream = "https://proxy.golang.org"
/// cache_dir = "/var/cache/modgate"
///
/// [[module]]
/// pattern = "^go\\.example\\.com/"
///
/// [[repository]]
/// prefix = "go.example.com/internal"
/// url = "https://git.example.com/internal.git"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Upstream module proxy URL
    pub upstream: Option<String>,

    /// Directory holding cached working copies
    pub cache_dir: Option<String>,

    /// Modules served from source; everything else goes upstream
    #[serde(rename = "module")]
    pub modules: Vec<ModuleRule>,

    /// Pinned repository locations, consulted before discovery
    #[serde(rename = "repository")]
    pub repositories: Vec<RepositoryPin>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.is_empty() {
            return Err(ConfigError::InvalidValue(
                "at least one [[module]] pattern is required".to_string(),
            ));
        }

        for rule in &self.modules {
            rule.validate()?;
        }

        for pin in &self.repositories {
            pin.validate()?;
        }

        if let Some(upstream) = &self.upstream {
            validate_upstream(upstream)?;
        }

        Ok(())
    }
}

/// A module inclusion rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleRule {
    /// Regular expression matched against the module path
    pub pattern: String,
}

impl ModuleRule {
    /// Validate the pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        regex::Regex::new(&self.pattern).map_err(|e| {
            ConfigError::InvalidValue(format!("invalid module pattern '{}': {}", self.pattern, e))
        })?;
        Ok(())
    }
}

/// A pinned repository location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RepositoryPin {
    /// Import path prefix that is the repository root
    pub prefix: String,

    /// Git remote URL (or local path) of the repository
    pub url: String,
}

impl RepositoryPin {
    /// Validate the prefix is a module path and the URL is non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ModulePath::new(self.prefix.as_str()).map_err(|e| {
            ConfigError::InvalidValue(format!("invalid repository prefix: {}", e))
        })?;

        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "repository '{}' has an empty url",
                self.prefix
            )));
        }

        Ok(())
    }
}

/// Validate an upstream URL.
pub fn validate_upstream(upstream: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(upstream)
        .map_err(|e| ConfigError::InvalidValue(format!("invalid upstream '{}': {}", upstream, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "invalid upstream '{}': unsupported scheme '{}'",
            upstream, other
        ))),
    }
}
