//! module::descriptor
//!
//! Reading the module path out of a `go.mod` file.
//!
//! Only the `module` directive matters here. It may name the path bare,
//! double-quoted or back-quoted, and `//` comments are ignored:
//!
//! ```text
//! module example.com/r // the root module
//! module "example.com/r"
//! module `example.com/r`
//! ```

use thiserror::Error;

/// File name of a module descriptor.
pub const DESCRIPTOR_FILE: &str = "go.mod";

/// Errors from descriptor parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("no module directive")]
    Missing,

    #[error("{count} module directives")]
    Multiple { count: usize },

    #[error("malformed module directive on line {line}")]
    Malformed { line: usize },
}

/// Extract the module path from descriptor contents.
///
/// # Errors
///
/// Fails when there is not exactly one well-formed `module` directive.
///
/// # Example
///
/// ```
/// use modgate::module::descriptor::parse_module_path;
///
/// let contents = "module example.com/r\n\ngo 1.21\n";
/// assert_eq!(parse_module_path(contents).unwrap(), "example.com/r");
/// ```
pub fn parse_module_path(contents: &str) -> Result<String, DescriptorError> {
    let mut found = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim_start();
        let rest = match line.strip_prefix("module") {
            Some(rest) if rest.is_empty() || rest.starts_with([' ', '\t', '"', '`']) => rest,
            _ => continue,
        };

        let path = parse_argument(rest.trim()).ok_or(DescriptorError::Malformed { line: index + 1 })?;
        found.push(path);
    }

    match found.len() {
        0 => Err(DescriptorError::Missing),
        1 => Ok(found.remove(0)),
        count => Err(DescriptorError::Multiple { count }),
    }
}

/// Parse the single argument of a directive, dropping a trailing comment.
fn parse_argument(rest: &str) -> Option<String> {
    let (path, tail) = match rest.chars().next()? {
        quote @ ('"' | '`') => {
            let body = &rest[1..];
            let end = body.find(quote)?;
            let raw = &body[..end];
            if quote == '"' && raw.contains('\\') {
                // Escapes never appear in valid module paths.
                return None;
            }
            (raw, &body[end + 1..])
        }
        _ => {
            let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let token = &rest[..token_end];
            let token = token.split("//").next().unwrap_or(token);
            let tail = &rest[token.len()..];
            (token, tail)
        }
    };

    let tail = tail.trim();
    if path.is_empty() || !(tail.is_empty() || tail.starts_with("//")) {
        return None;
    }

    Some(path.to_string())
}
