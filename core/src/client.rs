//! Request executor and verb-shaped resource client for the workflow API.
//!
//! # Design
//! `ApiService` owns no mutable state. It holds the backend base URL plus
//! three injected collaborators: the `Transport` that performs I/O, the
//! read-only `AuthContext`, and the `Navigator` used for recovery redirects.
//! A call is split into `build_request` (URL + preparation) and
//! `parse_response` (interpretation + recovery), so a host that prefers to
//! run the HTTP round-trip itself can do so between the two; `request` wires
//! both around the configured transport.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::AuthContext;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{Body, HttpMethod, HttpRequest, HttpResponse};
use crate::navigation::{Navigator, PUBLIC_SIGN_OUT_PATH, SIGN_IN_PATH};
use crate::request::{prepare_request, ApiOptions};
use crate::response::interpret_response;
use crate::transport::{ReqwestTransport, Transport, TransportError};
use crate::url::build_url;

#[derive(Clone)]
pub struct ApiService {
    base_url: String,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthContext>,
    navigator: Arc<dyn Navigator>,
}

impl ApiService {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthContext>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            auth,
            navigator,
        }
    }

    /// Build a service backed by `ReqwestTransport` using `config`.
    pub fn from_config(
        config: &ClientConfig,
        auth: Arc<dyn AuthContext>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.request_timeout()).map_err(transport_error)?;
        Ok(Self::new(
            &config.backend_base_url,
            Arc::new(transport),
            auth,
            navigator,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve the URL for `path` and prepare the request for the wire.
    pub fn build_request(&self, path: &str, options: ApiOptions) -> Result<HttpRequest, ApiError> {
        let url = build_url(&self.base_url, path, &options.query_params)?;
        prepare_request(url, options, self.auth.as_ref())
    }

    /// Interpret `response`, running the recovery redirect on failure.
    pub fn parse_response<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        interpret_response(response).inspect_err(|err| self.recover(err))
    }

    /// Execute one call: build, send, interpret.
    ///
    /// The returned error is never swallowed by recovery; a redirect, if any,
    /// happens once, after classification. Dropping the future before it
    /// resolves performs no side effect.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        let request = self.build_request(path, options)?;
        let method = request.method;
        debug!(%method, url = %request.url, "sending request");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%method, path, error = %err, "transport failed");
                return Err(transport_error(err));
            }
        };

        let result = self.parse_response(response);
        if let Err(err) = &result {
            warn!(%method, path, error = %err, "request failed");
        }
        result
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        self.request(path, with_method(options, HttpMethod::Get, None))
            .await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Body>,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        self.request(path, with_method(options, HttpMethod::Post, body))
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Body>,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        self.request(path, with_method(options, HttpMethod::Put, body))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Body>,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        self.request(path, with_method(options, HttpMethod::Patch, body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: ApiOptions,
    ) -> Result<T, ApiError> {
        self.request(path, with_method(options, HttpMethod::Delete, None))
            .await
    }

    fn recover(&self, err: &ApiError) {
        match err {
            ApiError::Unauthenticated
                if !self.auth.is_logged_in() && self.navigator.current_path() != SIGN_IN_PATH =>
            {
                let href = format!(
                    "{SIGN_IN_PATH}?original_url={}",
                    urlencoding::encode(&self.auth.current_location())
                );
                info!(%href, "redirecting to sign-in");
                self.navigator.navigate(&href);
            }
            ApiError::Forbidden { .. } if self.auth.is_public_user() => {
                info!("signing out public user after 403");
                self.navigator.navigate(PUBLIC_SIGN_OUT_PATH);
            }
            _ => {}
        }
    }
}

fn with_method(mut options: ApiOptions, method: HttpMethod, body: Option<Body>) -> ApiOptions {
    options.method = method;
    options.body = body;
    options
}

/// Requests rejected before sending are not retried; everything else the
/// transport reports is a network failure.
fn transport_error(err: TransportError) -> ApiError {
    match err {
        TransportError::InvalidRequest(message) => ApiError::InvalidRequest(message),
        err => ApiError::NetworkFailure(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionAuth;
    use crate::navigation::HistoryNavigator;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Other("connection refused".to_string()))
        }
    }

    /// Records the request and replays one canned response.
    struct Canned {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                status_text: String::new(),
                headers: Vec::new(),
                body: self.body.to_string(),
            })
        }
    }

    fn canned(status: u16, body: &'static str) -> Arc<Canned> {
        Arc::new(Canned {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn service(
        transport: Arc<dyn Transport>,
        auth: Arc<SessionAuth>,
        nav: Arc<HistoryNavigator>,
    ) -> ApiService {
        ApiService::new("http://localhost:7000/v1.0/", transport, auth, nav)
    }

    #[test]
    fn build_request_strips_prefix_and_prepares() {
        let auth = Arc::new(SessionAuth::signed_in("tok", None));
        let api = service(
            canned(200, "{}"),
            auth,
            Arc::new(HistoryNavigator::default()),
        );
        let req = api
            .build_request(
                "/v1.0/process-instances/42",
                ApiOptions::default().with_query("include", true),
            )
            .unwrap();
        assert_eq!(
            req.url,
            "http://localhost:7000/v1.0/process-instances/42?include=true"
        );
        assert_eq!(req.header("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn verbs_set_method_and_body() {
        let transport = canned(200, r#"{"ok":true}"#);
        let api = service(
            transport.clone(),
            Arc::new(SessionAuth::new()),
            Arc::new(HistoryNavigator::default()),
        );

        let _: Value = api.get("/a", ApiOptions::default()).await.unwrap();
        let _: Value = api
            .post("/b", Some(json!({"x": 1}).into()), ApiOptions::default())
            .await
            .unwrap();
        let _: Value = api.put("/c", None, ApiOptions::default()).await.unwrap();
        let _: Value = api
            .patch("/d", Some(json!({"y": 2}).into()), ApiOptions::default())
            .await
            .unwrap();
        let _: Value = api.delete("/e", ApiOptions::default()).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let methods: Vec<HttpMethod> = seen.iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![
                HttpMethod::Get,
                HttpMethod::Post,
                HttpMethod::Put,
                HttpMethod::Patch,
                HttpMethod::Delete
            ]
        );
        assert_eq!(seen[1].body, Some(Body::Text(r#"{"x":1}"#.to_string())));
        assert!(seen[2].body.is_none());
    }

    #[tokio::test]
    async fn unauthenticated_redirects_to_sign_in_once() {
        let auth = Arc::new(SessionAuth::new());
        auth.set_location("/tasks?page=2");
        let nav = Arc::new(HistoryNavigator::new("/tasks"));
        let api = service(canned(401, ""), auth, nav.clone());

        let err = api.get::<Value>("/tasks", ApiOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
        assert_eq!(
            nav.visited(),
            vec!["/login?original_url=%2Ftasks%3Fpage%3D2".to_string()]
        );

        // Already on the sign-in page: no second redirect.
        let err = api.get::<Value>("/tasks", ApiOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
        assert_eq!(nav.visited().len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_while_logged_in_does_not_redirect() {
        let nav = Arc::new(HistoryNavigator::new("/tasks"));
        let api = service(
            canned(401, ""),
            Arc::new(SessionAuth::signed_in("expired", None)),
            nav.clone(),
        );
        let err = api.get::<Value>("/tasks", ApiOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
        assert!(nav.visited().is_empty());
    }

    #[tokio::test]
    async fn forbidden_signs_out_public_users_only() {
        let nav = Arc::new(HistoryNavigator::new("/public/form"));
        let auth = Arc::new(SessionAuth::new());
        auth.sign_in("tok", None, true);
        let api = service(canned(403, r#"{"message":"nope"}"#), auth.clone(), nav.clone());

        let err = api.get::<Value>("/x", ApiOptions::default()).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Forbidden {
                message: "nope".to_string()
            }
        );
        assert_eq!(nav.visited(), vec![PUBLIC_SIGN_OUT_PATH.to_string()]);

        auth.sign_in("tok", None, false);
        let _ = api.get::<Value>("/x", ApiOptions::default()).await.unwrap_err();
        assert_eq!(nav.visited().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_network_failure() {
        let nav = Arc::new(HistoryNavigator::default());
        let api = service(Arc::new(Unreachable), Arc::new(SessionAuth::new()), nav.clone());
        let err = api.get::<Value>("/x", ApiOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::NetworkFailure("connection refused".to_string()));
        assert!(nav.visited().is_empty());
    }

    struct Rejecting;

    #[async_trait]
    impl Transport for Rejecting {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::InvalidRequest("invalid HTTP header name".to_string()))
        }
    }

    #[tokio::test]
    async fn rejected_request_is_not_retryable() {
        let nav = Arc::new(HistoryNavigator::default());
        let api = service(Arc::new(Rejecting), Arc::new(SessionAuth::new()), nav.clone());
        let err = api.get::<Value>("/x", ApiOptions::default()).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::InvalidRequest("invalid HTTP header name".to_string())
        );
        assert!(!err.is_retryable());
        assert!(nav.visited().is_empty());
    }

    #[test]
    fn from_config_uses_configured_base_url() {
        let config = ClientConfig {
            backend_base_url: "https://spiff.example.com/v1.0/".to_string(),
            ..ClientConfig::default()
        };
        let api = ApiService::from_config(
            &config,
            Arc::new(SessionAuth::signed_in("tok", None)),
            Arc::new(HistoryNavigator::default()),
        )
        .unwrap();
        assert_eq!(api.base_url(), "https://spiff.example.com/v1.0");
        let req = api
            .build_request("/process-groups", ApiOptions::default())
            .unwrap();
        assert_eq!(req.url, "https://spiff.example.com/v1.0/process-groups");
        assert_eq!(req.header("Authorization"), Some("Bearer tok"));
    }

    #[test]
    fn absent_optional_query_is_left_out() {
        let api = service(
            canned(200, "{}"),
            Arc::new(SessionAuth::new()),
            Arc::new(HistoryNavigator::default()),
        );
        let req = api
            .build_request(
                "/process-instances",
                ApiOptions::default()
                    .with_optional_query("page", None::<i64>)
                    .with_optional_query("per_page", Some(10_i64)),
            )
            .unwrap();
        assert_eq!(
            req.url,
            "http://localhost:7000/v1.0/process-instances?per_page=10"
        );
    }

    #[test]
    fn parse_response_runs_recovery() {
        let nav = Arc::new(HistoryNavigator::new("/"));
        let api = service(canned(200, "{}"), Arc::new(SessionAuth::new()), nav.clone());
        let err = api
            .parse_response::<Value>(HttpResponse {
                status: 401,
                status_text: "Unauthorized".to_string(),
                headers: Vec::new(),
                body: String::new(),
            })
            .unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated);
        assert_eq!(nav.visited().len(), 1);
    }
}
