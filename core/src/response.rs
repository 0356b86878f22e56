//! Response interpretation.
//!
//! # Design
//! `interpret_response` is a pure function of the response: it classifies
//! failures into `ApiError` and never navigates. The executor applies the
//! navigation side effects afterwards, based on the classified error.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::ApiError;
use crate::http::HttpResponse;

const FORBIDDEN_MESSAGE: &str = "You do not have permission to access this resource.";
const MAX_DIAGNOSTIC_BODY: usize = 500;

/// Classify `response` and decode its JSON body into `T`.
///
/// - 401 is `Unauthenticated`; the body is not looked at.
/// - An empty body decodes as `{}`.
/// - Invalid JSON with a 2xx status is `UnexpectedResponse`; with a failure
///   status the parse error itself is returned.
/// - 403 is `Forbidden`; any other non-2xx is `RequestFailed`. Both carry the
///   body's `message` field when it has one.
pub fn interpret_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    if response.status == 401 {
        return Err(ApiError::Unauthenticated);
    }

    let data: Value = if response.body.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_str(&response.body) {
            Ok(data) => data,
            Err(err) if response.is_success() => {
                error!(
                    status = response.status,
                    status_text = %response.status_text,
                    body = %response.body,
                    "received unexpected response from server: {err}"
                );
                return Err(ApiError::UnexpectedResponse {
                    status: response.status,
                    status_text: response.status_text,
                    body: response.body.chars().take(MAX_DIAGNOSTIC_BODY).collect(),
                });
            }
            Err(err) => return Err(ApiError::Deserialization(err.to_string())),
        }
    };

    if !response.is_success() {
        let server_message = data
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_owned);
        if response.status == 403 {
            return Err(ApiError::Forbidden {
                message: server_message.unwrap_or_else(|| FORBIDDEN_MESSAGE.to_string()),
            });
        }
        return Err(ApiError::RequestFailed {
            status: response.status,
            message: server_message
                .unwrap_or_else(|| format!("Request failed with status {}", response.status)),
        });
    }

    serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
}
