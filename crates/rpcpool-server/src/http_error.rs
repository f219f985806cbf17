use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Code placed in every HTTP-level error envelope.
const HTTP_ERROR_CODE: i64 = -32000;

/// A request the server refuses before or instead of reaching an actor.
///
/// Rendered as a JSON-RPC error envelope with a `null` id:
///
/// ```text
/// {"jsonrpc":"2.0","id":null,"error":{"code":-32000,
///   "message":"Service Unavailable: EMPTY ACTOR POOL",
///   "data":{"warning":"ERROR[503]: Service Unavailable: EMPTY ACTOR POOL",
///           "description":"No actors available to handle requests."}}}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub status: StatusCode,
    pub reason: String,
    pub description: String,
}

impl HttpError {
    pub fn new(status: StatusCode, reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            description: description.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason, description)
    }

    pub fn service_unavailable(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, reason, description)
    }

    pub fn bad_gateway(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, reason, description)
    }

    pub fn gateway_timeout(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, reason, description)
    }

    pub fn internal(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, reason, description)
    }

    /// `"<Status text>: <reason>"`, or just the status text without a reason.
    pub fn message(&self) -> String {
        let status_text = self.status.canonical_reason().unwrap_or("Error");
        if self.reason.is_empty() {
            status_text.to_string()
        } else {
            format!("{}: {}", status_text, self.reason)
        }
    }

    pub fn warning(&self) -> String {
        format!("ERROR[{}]: {}", self.status.as_u16(), self.message())
    }

    pub fn body(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {
                "code": HTTP_ERROR_CODE,
                "message": self.message(),
                "data": {
                    "warning": self.warning(),
                    "description": self.description,
                },
            },
        })
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        tracing::warn!(description = %self.description, "{}", self.warning());
        (self.status, Json(self.body())).into_response()
    }
}
