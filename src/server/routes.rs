//! server::routes
//!
//! Request path parsing for the module proxy protocol.
//!
//! | Path | Endpoint |
//! |---|---|
//! | `/{module}/@v/list` | [`Endpoint::List`] |
//! | `/{module}/@v/{version}.info` | [`Endpoint::Info`] |
//! | `/{module}/@v/{version}.mod` | [`Endpoint::Mod`] |
//! | `/{module}/@v/{version}.zip` | [`Endpoint::Zip`] |
//! | `/{module}/@latest` | [`Endpoint::Latest`] |
//!
//! Module paths and versions arrive case-encoded and are decoded by
//! [`Route::decode`].
//! Versions may contain `/` (namespaced tags such as `sub/v1.0.0`).

use hyper::StatusCode;
use thiserror::Error;

use crate::core::types::{decode_case, ModulePath};

/// Errors from path parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no such endpoint")]
    NoMatch,

    #[error("empty module path")]
    EmptyModule,

    #[error("invalid module path: {0}")]
    InvalidModule(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),
}

impl RouteError {
    /// Status code for the error.
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::NoMatch => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    List,
    Info(String),
    Mod(String),
    Zip(String),
    Latest,
}

impl Endpoint {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::List => "list",
            Endpoint::Info(_) => "info",
            Endpoint::Mod(_) => "mod",
            Endpoint::Zip(_) => "zip",
            Endpoint::Latest => "latest",
        }
    }
}

/// A matched request path: module plus endpoint.
///
/// [`parse`] leaves both in their case-encoded wire form so a request can be
/// forwarded exactly as received. [`Route::decode`] produces the validated,
/// decoded form used to serve it locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub module: String,
    pub endpoint: Endpoint,
}

impl Route {
    /// Module path to match against the configured patterns.
    ///
    /// Decoded when the case encoding is valid, otherwise as requested.
    pub fn match_path(&self) -> String {
        decode_case(&self.module).unwrap_or_else(|_| self.module.clone())
    }

    /// Validate and case-decode the module path and version.
    ///
    /// # Example
    ///
    /// ```
    /// use modgate::server::routes::{parse, Endpoint};
    ///
    /// let route = parse("/github.com/!burnt!sushi/toml/@v/v1.2.0.info")
    ///     .and_then(|route| route.decode())
    ///     .unwrap();
    /// assert_eq!(route.module, "github.com/BurntSushi/toml");
    /// assert_eq!(route.endpoint, Endpoint::Info("v1.2.0".to_string()));
    /// ```
    pub fn decode(self) -> Result<Route, RouteError> {
        let module = ModulePath::from_escaped(&self.module)
            .map_err(|e| RouteError::InvalidModule(e.to_string()))?;

        let decode_version = |raw: String| {
            decode_case(&raw).map_err(|e| RouteError::InvalidVersion(e.to_string()))
        };
        let endpoint = match self.endpoint {
            Endpoint::List => Endpoint::List,
            Endpoint::Latest => Endpoint::Latest,
            Endpoint::Info(v) => Endpoint::Info(decode_version(v)?),
            Endpoint::Mod(v) => Endpoint::Mod(decode_version(v)?),
            Endpoint::Zip(v) => Endpoint::Zip(decode_version(v)?),
        };

        Ok(Route {
            module: module.as_str().to_string(),
            endpoint,
        })
    }
}

/// Match a request path against the protocol endpoints.
///
/// Only the shape of the path is checked; the module and version are
/// returned still case-encoded.
///
/// # Example
///
/// ```
/// use modgate::server::routes::{parse, Endpoint};
///
/// let route = parse("/github.com/Azure/sdk/@latest").unwrap();
/// assert_eq!(route.module, "github.com/Azure/sdk");
/// assert_eq!(route.endpoint, Endpoint::Latest);
/// ```
pub fn parse(path: &str) -> Result<Route, RouteError> {
    let trimmed = path.strip_prefix('/').ok_or(RouteError::NoMatch)?;

    let (module, endpoint) = if let Some(prefix) = trimmed.strip_suffix("@latest") {
        (module_part(prefix)?, Endpoint::Latest)
    } else if let Some(index) = trimmed.find("@v/") {
        let module = module_part(&trimmed[..index])?;
        (module, parse_version_file(&trimmed[index + 3..])?)
    } else {
        return Err(RouteError::NoMatch);
    };

    if module.is_empty() {
        return Err(RouteError::EmptyModule);
    }

    Ok(Route {
        module: module.to_string(),
        endpoint,
    })
}

/// The module part before `@v/` or `@latest`: empty, or ending in `/`.
fn module_part(prefix: &str) -> Result<&str, RouteError> {
    if prefix.is_empty() {
        return Ok(prefix);
    }
    prefix.strip_suffix('/').ok_or(RouteError::NoMatch)
}

fn parse_version_file(rest: &str) -> Result<Endpoint, RouteError> {
    if rest == "list" {
        return Ok(Endpoint::List);
    }

    let (raw, make): (&str, fn(String) -> Endpoint) = if let Some(v) = rest.strip_suffix(".info") {
        (v, Endpoint::Info)
    } else if let Some(v) = rest.strip_suffix(".mod") {
        (v, Endpoint::Mod)
    } else if let Some(v) = rest.strip_suffix(".zip") {
        (v, Endpoint::Zip)
    } else {
        return Err(RouteError::NoMatch);
    };

    if raw.is_empty() || raw.starts_with('/') || raw.ends_with('/') {
        return Err(RouteError::NoMatch);
    }

    Ok(make(raw.to_string()))
}
