//! Caller options and request preparation.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::http::{Body, CacheMode, Credentials, HttpMethod, HttpRequest};
use crate::url::QueryValue;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const AUTH_IDENTIFIER_HEADER: &str = "SpiffWorkflow-Authentication-Identifier";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
const DEFAULT_AUTH_IDENTIFIER: &str = "default";

/// Per-call request options. `Default` gives a GET that requires auth.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiOptions {
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Body>,
    pub query_params: BTreeMap<String, Option<QueryValue>>,
    pub require_auth: bool,
    pub cache: CacheMode,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            query_params: BTreeMap::new(),
            require_auth: true,
            cache: CacheMode::Default,
        }
    }
}

impl ApiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_params.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a parameter that is left out of the URL when `value` is `None`.
    pub fn with_optional_query<V: Into<QueryValue>>(
        mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        self.query_params.insert(key.into(), value.map(Into::into));
        self
    }

    pub fn without_auth(mut self) -> Self {
        self.require_auth = false;
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }
}

/// Turn caller options into a ready-to-send request for `url`.
///
/// Auth headers are added only when the call requires auth and the session
/// is logged in; a logged-out session is not an error here, the engine's 401
/// reports it. Non-empty JSON objects and arrays are serialized with a JSON
/// content type; every other body is passed through.
pub fn prepare_request(
    url: String,
    options: ApiOptions,
    auth: &dyn AuthContext,
) -> Result<HttpRequest, ApiError> {
    let ApiOptions {
        method,
        mut headers,
        body,
        require_auth,
        cache,
        ..
    } = options;

    if require_auth && auth.is_logged_in() {
        let token = auth.access_token().unwrap_or_default();
        headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        let identifier = auth
            .authentication_identifier()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_IDENTIFIER.to_string());
        headers.insert(AUTH_IDENTIFIER_HEADER.to_string(), identifier);
    }

    let body = match body {
        Some(body) if body.is_present() => Some(encode_body(body, &mut headers)?),
        _ => None,
    };

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
        credentials: Credentials::Include,
        cache,
    })
}

fn encode_body(body: Body, headers: &mut BTreeMap<String, String>) -> Result<Body, ApiError> {
    match body {
        Body::Json(value) if is_non_empty_structure(&value) => {
            let text =
                serde_json::to_string(&value).map_err(|e| ApiError::Serialization(e.to_string()))?;
            headers.insert(CONTENT_TYPE_HEADER.to_string(), "application/json".to_string());
            Ok(Body::Text(text))
        }
        other => Ok(other),
    }
}

fn is_non_empty_structure(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}
