//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ModulePath`] - Validated module import path
//!
//! # Case Encoding
//!
//! The module proxy protocol cannot rely on case-sensitive file systems, so
//! clients encode every uppercase letter in a module path or version as `!`
//! followed by the lowercase letter (`github.com/Azure` → `github.com/!azure`).
//! [`decode_case`] reverses this before a path is matched or resolved.
//!
//! # Examples
//!
//! ```
//! use modgate::core::types::ModulePath;
//!
//! let path = ModulePath::from_escaped("github.com/!azure/go-autorest").unwrap();
//! assert_eq!(path.as_str(), "github.com/Azure/go-autorest");
//!
//! assert!(ModulePath::new("").is_err());
//! assert!(ModulePath::new("example.com/../etc").is_err());
//! ```

use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid module path: {0}")]
    InvalidModulePath(String),

    #[error("invalid case encoding: {0}")]
    InvalidEncoding(String),
}

/// A validated module import path.
///
/// Module paths must:
/// - Be non-empty
/// - Not start or end with `/`
/// - Not contain empty, `.` or `..` elements
/// - Not contain whitespace, control characters, `\` or `@`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModulePath(String);

impl ModulePath {
    /// Create a new validated module path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidModulePath` if the path is malformed.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    /// Create a module path from its case-encoded protocol form.
    pub fn from_escaped(escaped: &str) -> Result<Self, TypeError> {
        Self::new(decode_case(escaped)?)
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidModulePath(
                "module path cannot be empty".into(),
            ));
        }

        if path.starts_with('/') || path.ends_with('/') {
            return Err(TypeError::InvalidModulePath(format!(
                "'{}' has a leading or trailing slash",
                path
            )));
        }

        for element in path.split('/') {
            if element.is_empty() || element == "." || element == ".." {
                return Err(TypeError::InvalidModulePath(format!(
                    "'{}' has an empty or relative element",
                    path
                )));
            }
        }

        if path
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || c == '\\' || c == '@')
        {
            return Err(TypeError::InvalidModulePath(format!(
                "'{}' contains a forbidden character",
                path
            )));
        }

        Ok(())
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this module relative to a repository root.
    ///
    /// Returns `Some("")` for the root itself and `None` when the module is
    /// not under `root`.
    ///
    /// # Example
    ///
    /// ```
    /// use modgate::core::types::ModulePath;
    ///
    /// let path = ModulePath::new("example.com/r/pkg/api").unwrap();
    /// assert_eq!(path.relative_to("example.com/r"), Some("pkg/api"));
    /// assert_eq!(path.relative_to("example.com/r/pkg/api"), Some(""));
    /// assert_eq!(path.relative_to("example.com/rr"), None);
    /// ```
    pub fn relative_to(&self, root: &str) -> Option<&str> {
        relative_import_path(&self.0, root)
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ModulePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip a repository root from an import path, element-wise.
pub fn relative_import_path<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if path == root {
        return Some("");
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Decode the `!`-escaped uppercase letters of the protocol's case encoding.
///
/// # Errors
///
/// Returns `TypeError::InvalidEncoding` for a bare uppercase letter, a
/// trailing `!`, or `!` followed by anything other than a lowercase letter.
///
/// # Example
///
/// ```
/// use modgate::core::types::decode_case;
///
/// assert_eq!(decode_case("github.com/!burnt!sushi/toml").unwrap(), "github.com/BurntSushi/toml");
/// assert!(decode_case("github.com/BurntSushi").is_err());
/// ```
pub fn decode_case(escaped: &str) -> Result<String, TypeError> {
    let mut decoded = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => {
                    decoded.push(next.to_ascii_uppercase());
                }
                _ => return Err(TypeError::InvalidEncoding(escaped.to_string())),
            },
            c if c.is_ascii_uppercase() => {
                return Err(TypeError::InvalidEncoding(escaped.to_string()));
            }
            c => decoded.push(c),
        }
    }

    Ok(decoded)
}

/// Encode uppercase letters as `!` plus the lowercase letter.
///
/// The inverse of [`decode_case`]. Encoded paths never differ only by case.
///
/// # Example
///
/// ```
/// use modgate::core::types::encode_case;
///
/// assert_eq!(encode_case("github.com/BurntSushi/toml"), "github.com/!burnt!sushi/toml");
/// ```
pub fn encode_case(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            encoded.push('!');
            encoded.push(c.to_ascii_lowercase());
        } else {
            encoded.push(c);
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    mod module_path {
        use super::*;

        #[test]
        fn valid_paths() {
            assert!(ModulePath::new("example.com/r").is_ok());
            assert!(ModulePath::new("example.com/r/v2").is_ok());
            assert!(ModulePath::new("127.0.0.1:8080/repo").is_ok());
        }

        #[test]
        fn invalid_paths() {
            assert!(ModulePath::new("").is_err());
            assert!(ModulePath::new("/example.com").is_err());
            assert!(ModulePath::new("example.com/").is_err());
            assert!(ModulePath::new("example.com//r").is_err());
            assert!(ModulePath::new("example.com/./r").is_err());
            assert!(ModulePath::new("example.com/has space").is_err());
            assert!(ModulePath::new("example.com\\r").is_err());
            assert!(ModulePath::new("example.com/r@v1").is_err());
        }

        #[test]
        fn relative_paths_are_element_wise() {
            let path = ModulePath::new("example.com/r/sub").unwrap();
            assert_eq!(path.relative_to("example.com/r"), Some("sub"));
            assert_eq!(path.relative_to("example.com/r/su"), None);
            assert_eq!(path.relative_to("example.com"), Some("r/sub"));
        }

        #[test]
        fn display_matches_str() {
            let path = ModulePath::new("example.com/r").unwrap();
            assert_eq!(path.to_string(), "example.com/r");
        }
    }

    mod case_encoding {
        use super::*;

        #[test]
        fn lowercase_passes_through() {
            assert_eq!(decode_case("example.com/r").unwrap(), "example.com/r");
        }

        #[test]
        fn escaped_letters_decode() {
            assert_eq!(decode_case("!a!b!c").unwrap(), "ABC");
            assert_eq!(decode_case("v1.0.0-!r!c1").unwrap(), "v1.0.0-RC1");
        }

        #[test]
        fn malformed_encodings_fail() {
            assert!(decode_case("Example.com").is_err());
            assert!(decode_case("example.com!").is_err());
            assert!(decode_case("example.com/!1").is_err());
            assert!(decode_case("example.com/!A").is_err());
        }

        #[test]
        fn encode_inverts_decode() {
            let path = "github.com/BurntSushi/toml";
            assert_eq!(decode_case(&encode_case(path)).unwrap(), path);
            assert_eq!(encode_case("example.com/r"), "example.com/r");
        }
    }
}
