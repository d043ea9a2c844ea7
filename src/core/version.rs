//! core::version
//!
//! Version tag syntax and precedence.
//!
//! # Tag Syntax
//!
//! A version tag is `v` followed by a semantic version. The shorthand forms
//! `vMAJOR` and `vMAJOR.MINOR` are accepted when they carry no prerelease or
//! build suffix, and compare as if padded with `.0`.
//!
//! Nested modules in a monorepo namespace their tags with the module's
//! subdirectory: the module at `pkg/api` is released as `pkg/api/v1.2.0`.
//!
//! # Ordering
//!
//! Tags are ordered by semantic-version precedence (build metadata ignored),
//! and ties are broken by the raw tag string so that the order is total and
//! deterministic.
//!
//! # Example
//!
//! ```
//! use modgate::core::version;
//!
//! let mut tags = vec!["v1.10.0", "v1.2.0", "v1.2.0-pre"];
//! tags.sort_by(|a, b| version::compare(a, b));
//! assert_eq!(tags, vec!["v1.2.0-pre", "v1.2.0", "v1.10.0"]);
//! ```

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// Parse a version tag (`v1.2.3`, `v1.2`, `v1`) into a semantic version.
///
/// Returns `None` for anything that is not a syntactically valid version.
///
/// # Example
///
/// ```
/// use modgate::core::version::parse;
///
/// assert_eq!(parse("v1.2").unwrap().to_string(), "1.2.0");
/// assert!(parse("1.2.3").is_none());
/// assert!(parse("v1.2-pre").is_none());
/// ```
pub fn parse(tag: &str) -> Option<semver::Version> {
    let body = tag.strip_prefix('v')?;
    if body.is_empty() {
        return None;
    }

    if body.contains(['-', '+']) {
        // Full form only; shorthand never carries a suffix.
        return semver::Version::parse(body).ok();
    }

    let padded = match body.matches('.').count() {
        0 => format!("{}.0.0", body),
        1 => format!("{}.0", body),
        _ => body.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

/// Check whether a string is a syntactically valid, un-namespaced version tag.
pub fn is_valid(tag: &str) -> bool {
    parse(tag).is_some()
}

/// Split a tag into its namespace prefix and version part.
///
/// `pkg/api/v1.0.0` splits into `(Some("pkg/api"), "v1.0.0")`; a bare
/// `v1.0.0` has no namespace.
pub fn split_namespace(tag: &str) -> (Option<&str>, &str) {
    match tag.rsplit_once('/') {
        Some((prefix, version)) => (Some(prefix), version),
        None => (None, tag),
    }
}

/// Check whether a tag is a version tag, bare or namespaced.
///
/// # Example
///
/// ```
/// use modgate::core::version::is_version_tag;
///
/// assert!(is_version_tag("v1.0.0"));
/// assert!(is_version_tag("sub/v2.0.0"));
/// assert!(!is_version_tag("release-2024"));
/// assert!(!is_version_tag("/v1.0.0"));
/// ```
pub fn is_version_tag(tag: &str) -> bool {
    match split_namespace(tag) {
        (Some(prefix), version) => !prefix.is_empty() && is_valid(version),
        (None, version) => is_valid(version),
    }
}

/// Compare two semantic versions by precedence.
///
/// Build metadata does not participate. A release has higher precedence than
/// any of its prereleases.
pub fn precedence(a: &semver::Version, b: &semver::Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.pre.cmp(&b.pre),
        })
}

/// Total order over version tags.
///
/// Compares the version part of each tag (namespace stripped) by precedence,
/// then falls back to the raw tag string. Tags whose version part does not
/// parse sort before all valid versions.
pub fn compare(a: &str, b: &str) -> Ordering {
    let pa = parse(split_namespace(a).1);
    let pb = parse(split_namespace(b).1);

    let by_precedence = match (&pa, &pb) {
        (Some(va), Some(vb)) => precedence(va, vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };

    by_precedence.then_with(|| a.cmp(b))
}

/// Check whether a requested version names a commit rather than a tag.
///
/// Both raw hexadecimal commit hashes and pseudo-versions
/// (`v0.0.0-20240102150405-abcdefabcdef`) are commit references. Serving them
/// would require resolving arbitrary commits, which the proxy does not do.
///
/// # Example
///
/// ```
/// use modgate::core::version::is_commit_reference;
///
/// assert!(is_commit_reference("4f2a9c1"));
/// assert!(is_commit_reference("v0.0.0-20240102150405-abcdefabcdef"));
/// assert!(!is_commit_reference("v1.2.3"));
/// ```
pub fn is_commit_reference(version: &str) -> bool {
    static HASH: OnceLock<Regex> = OnceLock::new();
    static PSEUDO: OnceLock<Regex> = OnceLock::new();

    let hash = HASH.get_or_init(|| Regex::new(r"^[0-9a-f]{7,40}$").expect("valid regex"));
    let pseudo = PSEUDO.get_or_init(|| {
        Regex::new(
            r"^v[0-9]+\.(0\.0-|\d+\.\d+-([^+]*\.)?0\.)\d{14}-[A-Za-z0-9]+(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$",
        )
        .expect("valid regex")
    });

    let (_, version) = split_namespace(version);
    hash.is_match(version) || pseudo.is_match(version)
}
