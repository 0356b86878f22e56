//! Network execution of prepared requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CACHE_CONTROL};
use reqwest::multipart::{Form, Part};

use crate::http::{Body, CacheMode, FormData, FormValue, HttpMethod, HttpRequest, HttpResponse};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request was rejected before anything went on the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Http(err)
        }
    }
}

/// Executes one `HttpRequest` and returns the response with its body read.
///
/// Non-2xx statuses are responses, not errors; only failures to obtain a
/// status at all are `TransportError`s.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport with a cookie store, so session cookies travel
/// with every request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.header(CACHE_CONTROL.as_str()).is_none() {
            if let Some(directive) = cache_control(request.cache) {
                builder = builder.header(CACHE_CONTROL, directive);
            }
        }
        builder = match request.body {
            None => builder,
            Some(Body::Text(text)) => builder.body(text),
            Some(Body::Json(value)) => builder.body(value.to_string()),
            Some(Body::Form(form)) => builder.multipart(multipart(form)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn cache_control(cache: CacheMode) -> Option<HeaderValue> {
    match cache {
        CacheMode::Default | CacheMode::ForceCache => None,
        CacheMode::NoStore => Some(HeaderValue::from_static("no-store")),
        CacheMode::Reload | CacheMode::NoCache => Some(HeaderValue::from_static("no-cache")),
    }
}

fn multipart(form: FormData) -> Result<Form, TransportError> {
    let mut multipart = Form::new();
    for part in form.parts().iter().cloned() {
        multipart = match part.value {
            FormValue::Text(text) => multipart.text(part.name, text),
            FormValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let mut file = Part::bytes(bytes).file_name(file_name);
                if let Some(content_type) = content_type {
                    file = file.mime_str(&content_type)?;
                }
                multipart.part(part.name, file)
            }
        };
    }
    Ok(multipart)
}
