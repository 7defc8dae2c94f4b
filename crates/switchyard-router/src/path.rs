//! Channel path patterns, path parameters and query strings.
//!
//! Patterns are slash separated. A segment written as `{name}` matches any
//! single non-empty segment and captures it as a path parameter:
//!
//! - `/rooms/{id}/test` matches `/rooms/123/test` with `id = "123"`
//! - `/rooms/{id}/test` does not match `/rooms/123` or `/rooms/1/2/test`
//!
//! The pattern `*` is the wildcard channel. It never matches a path
//! directly; the router uses it as the fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Path of the wildcard channel.
pub const WILDCARD: &str = "*";

/// Regex for a `{name}` parameter segment.
static PARAM_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([^{}/]+)\}$").expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed channel path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = split_segments(&raw)
            .into_iter()
            .map(|segment| match PARAM_SEGMENT.captures(segment) {
                Some(captures) => Segment::Param(captures[1].to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is the wildcard pattern.
    pub fn is_wildcard(&self) -> bool {
        self.raw == WILDCARD
    }

    /// Whether the pattern declares any `{param}` segment.
    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Param(_)))
    }

    /// Names of the declared parameters, in order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Whether a concrete path (query string allowed) matches the whole pattern.
    pub fn matches(&self, path: &str) -> bool {
        if self.is_wildcard() {
            return false;
        }
        let concrete = split_segments(strip_query(path));
        concrete.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(concrete)
                .all(|(segment, value)| match segment {
                    Segment::Literal(literal) => literal == value,
                    Segment::Param(_) => !value.is_empty(),
                })
    }

    /// Extract parameters by position.
    ///
    /// Segments beyond the pattern, or parameters beyond the path, are
    /// simply absent from the result.
    pub fn extract_params(&self, path: &str) -> HashMap<String, String> {
        split_segments(strip_query(path))
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match self.segments.get(index) {
                Some(Segment::Param(name)) => Some((name.clone(), value.to_string())),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a raw query string into a flat map.
///
/// Keys and values are percent-decoded. A repeated key keeps its last value
/// and a key without `=` maps to an empty string.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

/// Split a request target into path and raw query.
///
/// A full URL (`ws://host/path?q`) is reduced to its path first. An empty
/// path becomes `/`.
pub fn split_target(target: &str) -> (String, String) {
    let without_origin = match target.find("://") {
        Some(index) => {
            let rest = &target[index + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
        }
        None => target,
    };
    let (path, query) = without_origin
        .split_once('?')
        .unwrap_or((without_origin, ""));
    let path = if path.is_empty() { "/" } else { path };
    (path.to_string(), query.to_string())
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map(|(path, _)| path).unwrap_or(path)
}

/// Segments after the leading slash. Empty segments are kept, so `/chat/`
/// and `//chat` differ from `/chat`.
fn split_segments(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
