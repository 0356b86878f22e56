//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! pipeline builds an `HttpRequest`, hands it to a `Transport` (or to the
//! host, which executes it itself), and interprets the `HttpResponse` that
//! comes back. Keeping the wire shape as data lets every decision about
//! headers, bodies and status codes be tested without a network.
//!
//! All fields use owned types so values can move freely between tasks.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache directive forwarded verbatim to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
}

/// Credential inclusion mode. The pipeline always sends `Include`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    Include,
}

/// A single field of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

/// Binary/multipart payload. Never re-encoded by the pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::Text(value.into()),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: FormValue::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_owned),
                bytes,
            },
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }
}

/// Request payload, before and after preparation.
///
/// Callers hand in `Json` or `Form`; the preparer turns non-empty JSON
/// objects and arrays into `Text` carrying the serialized document.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Form(FormData),
    Text(String),
}

impl Body {
    /// Mirrors the truthiness check the browser client applies to bodies:
    /// `null`, `false`, `0` and empty strings count as "no body".
    pub(crate) fn is_present(&self) -> bool {
        match self {
            Body::Json(Value::Null) | Body::Json(Value::Bool(false)) => false,
            Body::Json(Value::Number(n)) => n.as_f64() != Some(0.0),
            Body::Json(Value::String(s)) | Body::Text(s) => !s.is_empty(),
            Body::Json(_) | Body::Form(_) => true,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<FormData> for Body {
    fn from(form: FormData) -> Self {
        Body::Form(form)
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiService::build_request`. A `Transport` (or the host) is
/// responsible for executing it and returning the corresponding
/// `HttpResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Body>,
    pub credentials: Credentials,
    pub cache: CacheMode,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// `body` holds the complete body text, read exactly once by whoever
/// executed the request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_bodies_are_not_present() {
        assert!(!Body::Json(Value::Null).is_present());
        assert!(!Body::Json(json!(false)).is_present());
        assert!(!Body::Json(json!(0)).is_present());
        assert!(!Body::Json(json!("")).is_present());
        assert!(!Body::Text(String::new()).is_present());
    }

    #[test]
    fn empty_structures_are_still_present() {
        assert!(Body::Json(json!({})).is_present());
        assert!(Body::Json(json!([])).is_present());
        assert!(Body::Form(FormData::new()).is_present());
        assert!(Body::Json(json!(3)).is_present());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost:7000/x".to_string(),
            headers,
            body: None,
            credentials: Credentials::Include,
            cache: CacheMode::Default,
        };
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn success_range_is_2xx() {
        let mut response = HttpResponse {
            status: 204,
            status_text: "No Content".to_string(),
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(response.is_success());
        response.status = 304;
        assert!(!response.is_success());
    }

    #[test]
    fn method_renders_upper_case() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }
}
