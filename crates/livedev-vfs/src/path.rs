//! Project-relative path normalization.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path escapes the project root")]
    Escapes,
    #[error("path is not valid UTF-8 after decoding")]
    Undecodable,
    #[error("path contains a forbidden character")]
    Invalid,
}

/// Normalize a `/`-separated project path.
///
/// `.` segments and empty segments are dropped, `..` pops the previous
/// segment. Popping past the root is an escape. The result has no leading
/// or trailing slash; the project root itself is the empty string.
pub fn normalize(path: &str) -> Result<String, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Escapes);
                }
            }
            s if s.contains('\0') => return Err(PathError::Invalid),
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Percent-decode a URL path, then normalize it.
pub fn decode(raw: &str) -> Result<String, PathError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| PathError::Undecodable)?;
    normalize(&decoded)
}

/// Drop `?query` and `#fragment` from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Drop a leading `scheme://authority`, leaving the absolute path.
///
/// Only a `://` before the first `/` counts as an origin.
pub fn strip_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    if url[..scheme_end].contains('/') {
        return url;
    }
    let rest = &url[scheme_end + 3..];
    match rest.find('/') {
        Some(i) => &rest[i..],
        None => "/",
    }
}
