//! Error types for the workflow API client.
//!
//! # Design
//! Only the response interpreter and the request executor construct the
//! first five variants; everything above them (resource client, query cache,
//! callers) passes errors through untouched. `Unauthenticated` and
//! `Forbidden` get dedicated variants because the executor attaches a
//! navigation side effect to each of them. Every other non-2xx response with
//! a JSON body lands in `RequestFailed`.
//!
//! `ApiError` is `Clone` so a single in-flight fetch can hand the same outcome
//! to every reader that joined it.

/// Errors produced by the request pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The server returned 401.
    #[error("You must be authenticated to do this.")]
    Unauthenticated,

    /// The server returned 403.
    #[error("{message}")]
    Forbidden { message: String },

    /// Any other non-2xx status with a parseable body.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// A 2xx status whose body is not valid JSON. `body` is truncated.
    #[error("Received unexpected response from server. {status}: {status_text}")]
    UnexpectedResponse {
        status: u16,
        status_text: String,
        body: String,
    },

    /// The transport failed before a status was obtained.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A body could not be parsed, or valid JSON did not match the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A value could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend base URL or the request path could not form a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request could not be constructed locally (bad header, form part,
    /// or HTTP client setup). Nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status carried by the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthenticated => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::RequestFailed { status, .. } | ApiError::UnexpectedResponse { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether a read may be attempted again automatically.
    ///
    /// Only transport failures qualify; a classified server answer is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::NetworkFailure(_))
    }
}
