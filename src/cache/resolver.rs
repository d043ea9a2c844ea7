//! cache::resolver
//!
//! Import path to repository root resolution.
//!
//! # Design
//!
//! The [`RootResolver`] trait is async because discovery involves network
//! I/O. Two implementations are provided:
//!
//! - [`StaticResolver`]: configured prefix pins, longest prefix wins, with an
//!   optional fallback resolver for everything unpinned.
//! - [`DiscoveryResolver`]: well-known hosting conventions first, then the
//!   `?go-get=1` HTML discovery lookup against the import path itself.
//!
//! # Discovery
//!
//! A discovery response carries one or more tags of the form
//!
//! ```html
//! <meta name="go-import" content="example.com/r git https://git.example.com/r">
//! ```
//!
//! The entry whose prefix is an element-wise prefix of the import path wins.
//! Entries for the `mod` transport are ignored. Only `git` is supported.
//!
//! # Example
//!
//! ```ignore
//! use modgate::cache::resolver::{DiscoveryResolver, RootResolver};
//!
//! let resolver = DiscoveryResolver::new("modgate/0.1.0")?;
//! let source = resolver.resolve("github.com/acme/mono/pkg/api").await?;
//! assert_eq!(source.root, "github.com/acme/mono");
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use thiserror::Error;

use crate::core::config::RepositoryPin;
use crate::core::types::{relative_import_path, ModulePath};

/// Discovery request timeout.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// The only version control system served.
pub const VCS_GIT: &str = "git";

/// Hosts whose repository root is always `host/owner/repo`.
const CONVENTIONAL_HOSTS: [&str; 2] = ["github.com", "bitbucket.org"];

/// Errors from root resolution.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No repository serves the import path.
    #[error("no repository found for '{path}': {reason}")]
    NotFound { path: String, reason: String },

    /// The repository uses a version control system other than git.
    #[error("unsupported version control system '{vcs}' for '{path}'")]
    UnsupportedVcs { path: String, vcs: String },

    /// A resolved root is malformed or does not prefix the import path.
    #[error("invalid repository root '{root}' for '{path}'")]
    InvalidRoot { path: String, root: String },

    /// More than one discovery entry claims the import path.
    #[error("ambiguous repository roots for '{path}'")]
    Ambiguous { path: String },

    /// The discovery request itself failed.
    #[error("discovery request for '{path}' failed: {message}")]
    Http { path: String, message: String },
}

/// Where a repository root lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSource {
    /// Import path of the repository root
    pub root: String,
    /// Version control system (always `git`)
    pub vcs: String,
    /// Remote URL or local path to clone from
    pub url: String,
}

impl RepoSource {
    /// A git repository at `url` serving `root`.
    pub fn git(root: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            vcs: VCS_GIT.to_string(),
            url: url.into(),
        }
    }
}

/// Resolves an import path to the repository that hosts it.
#[async_trait]
pub trait RootResolver: Send + Sync {
    /// Resolve `import_path` to its repository root.
    async fn resolve(&self, import_path: &str) -> Result<RepoSource, ResolveError>;
}

/// Check a resolved root is well-formed and prefixes the import path.
fn validate_root(import_path: &str, source: RepoSource) -> Result<RepoSource, ResolveError> {
    let invalid = || ResolveError::InvalidRoot {
        path: import_path.to_string(),
        root: source.root.clone(),
    };

    ModulePath::new(source.root.as_str()).map_err(|_| invalid())?;
    if relative_import_path(import_path, &source.root).is_none() {
        return Err(invalid());
    }
    if source.vcs != VCS_GIT {
        return Err(ResolveError::UnsupportedVcs {
            path: import_path.to_string(),
            vcs: source.vcs,
        });
    }

    Ok(source)
}

// =============================================================================
// Static pins
// =============================================================================

/// Resolver backed by configured repository pins.
pub struct StaticResolver {
    pins: Vec<RepositoryPin>,
    fallback: Option<Arc<dyn RootResolver>>,
}

impl std::fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticResolver")
            .field("pins", &self.pins)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl StaticResolver {
    /// Resolver answering only from `pins`.
    pub fn new(pins: Vec<RepositoryPin>) -> Self {
        Self {
            pins,
            fallback: None,
        }
    }

    /// Consult `fallback` for import paths no pin covers.
    pub fn with_fallback(mut self, fallback: Arc<dyn RootResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn lookup(&self, import_path: &str) -> Option<&RepositoryPin> {
        self.pins
            .iter()
            .filter(|pin| relative_import_path(import_path, &pin.prefix).is_some())
            .max_by_key(|pin| pin.prefix.len())
    }
}

#[async_trait]
impl RootResolver for StaticResolver {
    async fn resolve(&self, import_path: &str) -> Result<RepoSource, ResolveError> {
        if let Some(pin) = self.lookup(import_path) {
            return validate_root(import_path, RepoSource::git(&pin.prefix, &pin.url));
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(import_path).await,
            None => Err(ResolveError::NotFound {
                path: import_path.to_string(),
                reason: "no repository pin matches".to_string(),
            }),
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// A parsed `go-import` meta tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMeta {
    pub prefix: String,
    pub vcs: String,
    pub url: String,
}

/// Resolver using hosting conventions and HTML discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    client: Client,
    scheme: String,
}

impl DiscoveryResolver {
    /// Create a resolver identifying itself as `identity`.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built (no TLS backend).
    pub fn new(identity: &str) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(identity) {
            headers.insert(USER_AGENT, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
        })
    }

    /// Use `scheme` for discovery lookups instead of `https`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Root for hosts with a fixed `host/owner/repo` layout.
    fn conventional(import_path: &str) -> Option<Result<RepoSource, ResolveError>> {
        let mut elements = import_path.split('/');
        let host = elements.next()?;
        if !CONVENTIONAL_HOSTS.contains(&host) {
            return None;
        }

        let root = match (elements.next(), elements.next()) {
            (Some(owner), Some(repo)) => format!("{}/{}/{}", host, owner, repo),
            _ => {
                return Some(Err(ResolveError::InvalidRoot {
                    path: import_path.to_string(),
                    root: import_path.to_string(),
                }))
            }
        };
        let url = format!("https://{}", root);

        Some(validate_root(import_path, RepoSource::git(root, url)))
    }

    async fn discover(&self, import_path: &str) -> Result<RepoSource, ResolveError> {
        let http_error = |e: reqwest::Error| ResolveError::Http {
            path: import_path.to_string(),
            message: e.to_string(),
        };

        let mut url = reqwest::Url::parse(&format!("{}://{}", self.scheme, import_path)).map_err(
            |e| ResolveError::Http {
                path: import_path.to_string(),
                message: e.to_string(),
            },
        )?;
        url.query_pairs_mut().append_pair("go-get", "1");

        tracing::debug!(module = import_path, %url, "discovering repository root");

        let response = self.client.get(url).send().await.map_err(http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(http_error)?;

        // The body is parsed whatever the status; hosts often serve the
        // meta tags on a 404 page.
        let metas = parse_meta_imports(&body);
        match select_meta(import_path, &metas)? {
            Some(meta) => validate_root(
                import_path,
                RepoSource {
                    root: meta.prefix.clone(),
                    vcs: meta.vcs.clone(),
                    url: meta.url.clone(),
                },
            ),
            None => Err(ResolveError::NotFound {
                path: import_path.to_string(),
                reason: format!("no go-import meta tag (status {})", status),
            }),
        }
    }
}

#[async_trait]
impl RootResolver for DiscoveryResolver {
    async fn resolve(&self, import_path: &str) -> Result<RepoSource, ResolveError> {
        match Self::conventional(import_path) {
            Some(result) => result,
            None => self.discover(import_path).await,
        }
    }
}

fn meta_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\s([^>]*)>").expect("valid regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
    })
}

/// Parse every `go-import` meta tag in the document head.
///
/// Scanning stops at `<body`, matching how discovery clients read the page.
pub fn parse_meta_imports(html: &str) -> Vec<ImportMeta> {
    let head_end = html
        .to_ascii_lowercase()
        .find("<body")
        .unwrap_or(html.len());
    let head = &html[..head_end];

    meta_tag_regex()
        .captures_iter(head)
        .filter_map(|tag| {
            let attributes = tag.get(1)?.as_str();
            let mut name = None;
            let mut content = None;
            for attribute in attribute_regex().captures_iter(attributes) {
                let key = attribute.get(1)?.as_str().to_ascii_lowercase();
                let value = attribute.get(2).or_else(|| attribute.get(3))?.as_str();
                match key.as_str() {
                    "name" => name = Some(value),
                    "content" => content = Some(value),
                    _ => {}
                }
            }

            if name != Some("go-import") {
                return None;
            }
            let fields: Vec<&str> = content?.split_whitespace().collect();
            match fields.as_slice() {
                [prefix, vcs, url] => Some(ImportMeta {
                    prefix: prefix.to_string(),
                    vcs: vcs.to_string(),
                    url: url.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Pick the entry serving `import_path`.
///
/// `mod` entries are ignored. Two different entries claiming the path is an
/// error.
fn select_meta<'a>(
    import_path: &str,
    metas: &'a [ImportMeta],
) -> Result<Option<&'a ImportMeta>, ResolveError> {
    let mut matching = metas
        .iter()
        .filter(|meta| meta.vcs != "mod")
        .filter(|meta| relative_import_path(import_path, &meta.prefix).is_some());

    let first = matching.next();
    if let Some(first) = first {
        if matching.any(|other| other != first) {
            return Err(ResolveError::Ambiguous {
                path: import_path.to_string(),
            });
        }
    }
    Ok(first)
}
