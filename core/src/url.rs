//! Request URL construction.
//!
//! Paths are written against the engine's versioned API (`/v1.0/...`) in
//! many call sites, while the configured backend base address already ends
//! in the version segment. The builder strips the legacy prefix so the two
//! never double up.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ApiError;

pub const LEGACY_PREFIX: &str = "/v1.0";

/// A query-parameter value, rendered the way the engine expects to read it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(s) => f.write_str(s),
            QueryValue::Int(n) => write!(f, "{n}"),
            QueryValue::Float(n) => write!(f, "{n}"),
            QueryValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

/// Join `base_url` and `path`, then append every present query parameter.
///
/// A leading `/v1.0` is removed from `path`; the rest of the path is passed
/// through as written. Parameters whose value is `None` are skipped.
pub fn build_url(
    base_url: &str,
    path: &str,
    query: &BTreeMap<String, Option<QueryValue>>,
) -> Result<String, ApiError> {
    let base = base_url.trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ApiError::InvalidUrl(format!(
            "backend base URL must be absolute: {base_url:?}"
        )));
    }

    let path = path.strip_prefix(LEGACY_PREFIX).unwrap_or(path);
    let mut url = format!("{base}{path}");

    let pairs: Vec<String> = query
        .iter()
        .filter_map(|(key, value)| {
            value.as_ref().map(|value| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&value.to_string())
                )
            })
        })
        .collect();
    if !pairs.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&pairs.join("&"));
    }

    Ok(url)
}
