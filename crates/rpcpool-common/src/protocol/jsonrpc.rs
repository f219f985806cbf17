//! JSON-RPC 2.0 Envelope
//!
//! Request and response shapes exchanged between the dispatch server, the
//! worker pool and its execution units.
//!
//! # Response Shape
//!
//! A [`Response`] is a tagged union: it carries exactly one of `result` or
//! `error`, never both and never neither. The [`Outcome`] enum is flattened
//! into the envelope so the wire form stays the familiar
//! `{"jsonrpc": "2.0", "id": ..., "result": ...}`.
//!
//! # Error Codes
//!
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000` to `-32099`: Server error
//! - `-31999` and above: Application error
//!
//! # Example
//!
//! ```
//! use rpcpool_common::protocol::jsonrpc::{Request, Response, RpcError};
//! use serde_json::json;
//!
//! let request = Request::new(7, "hello-world", json!(["a", "b"]));
//! let ok = Response::success(request.id.clone(), json!("done"));
//! let failed = Response::error(request.id, RpcError::method_not_found("hello-world"));
//! assert!(ok.is_success());
//! assert!(!failed.is_success());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid Request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i64 = -32603;
/// Base of the implementation-defined server error range
pub const SERVER_ERROR: i64 = -32000;
/// Base of the application error range
pub const APPLICATION_ERROR: i64 = -31999;

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC 2.0 request.
///
/// `id` is supplied by the caller and must come back unchanged in the
/// matching [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    /// Array or record of parameters
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Positional parameters, or an empty slice when params is a record.
    pub fn positional(&self) -> &[Value] {
        match &self.params {
            Value::Array(items) => items,
            _ => &[],
        }
    }
}

/// Exactly one of a success value or an error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(RpcError),
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// Create a success response
    pub fn success(id: impl Into<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            outcome: Outcome::Result(result),
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            outcome: Outcome::Error(error),
        }
    }

    /// Build a response from a handler result.
    pub fn from_result(id: impl Into<Value>, result: std::result::Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::error(id, err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    pub fn into_result(self) -> std::result::Result<Value, RpcError> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(err) => Err(err),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a parse error (-32700)
    pub fn parse_error(detail: &str) -> Self {
        Self::new(PARSE_ERROR, "Parse error: invalid JSON was received")
            .with_data(Value::String(detail.to_string()))
    }

    /// Create an invalid request error (-32600)
    pub fn invalid_request(detail: &str) -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request: not a valid Request object")
            .with_data(Value::String(detail.to_string()))
    }

    /// Create a method not found error (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {}", detail))
    }

    /// Create an internal error (-32603)
    ///
    /// Raised when a command handler fails inside an execution unit. The
    /// failure text is kept in `data` as well as in the message.
    pub fn internal_error(detail: &str) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {}", detail))
            .with_data(Value::String(detail.to_string()))
    }

    /// Create a server error in the -32000 to -32099 range.
    pub fn server_error(code: i64, message: &str) -> Self {
        Self::new(
            SERVER_ERROR - (code % 100).abs(),
            format!("Server error: {}", message),
        )
    }

    /// Create an application error at -31999 or above.
    pub fn application_error(code: i64, message: &str) -> Self {
        Self::new(
            APPLICATION_ERROR + (code % 31999).abs(),
            format!("Application error: {}", message),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_wire_shape() {
        let resp = Response::success(json!(7), json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}));
    }

    #[test]
    fn test_error_wire_shape_omits_result() {
        let resp = Response::error(json!("abc"), RpcError::method_not_found("nope"));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(value["id"], json!("abc"));
    }

    #[test]
    fn test_null_result_is_still_success() {
        let resp: Response = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_response_without_outcome_is_rejected() {
        let parsed = serde_json::from_str::<Response>(r#"{"jsonrpc":"2.0","id":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let raw = r#"{"jsonrpc":"2.0","id":3,"result":[1],"pid":"actor 1","performance":1.5}"#;
        let resp: Response = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.id, json!(3));
        assert_eq!(resp.outcome, Outcome::Result(json!([1])));
    }

    #[test]
    fn test_server_error_code_range() {
        assert_eq!(RpcError::server_error(0, "x").code, -32000);
        assert_eq!(RpcError::server_error(42, "x").code, -32042);
        assert_eq!(RpcError::server_error(-142, "x").code, -32042);
    }

    #[test]
    fn test_application_error_code_range() {
        assert_eq!(RpcError::application_error(0, "x").code, -31999);
        assert_eq!(RpcError::application_error(5, "x").code, -31994);
        assert_eq!(RpcError::application_error(31999, "x").code, -31999);
    }

    #[test]
    fn test_internal_error_mentions_failure() {
        let err = RpcError::internal_error("boom");
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.contains("Internal error"));
        assert!(err.message.contains("boom"));
        assert_eq!(err.data, Some(json!("boom")));
    }

    #[test]
    fn test_request_positional_params() {
        let req = Request::new(1, "m", json!(["a", 2]));
        assert_eq!(req.positional(), &[json!("a"), json!(2)]);

        let req = Request::new(1, "m", json!({"k": 1}));
        assert!(req.positional().is_empty());
    }

    #[test]
    fn test_request_defaults_version() {
        let req: Request = serde_json::from_str(r#"{"id":1,"method":"m"}"#).unwrap();
        assert_eq!(req.jsonrpc, JSONRPC_VERSION);
        assert_eq!(req.params, Value::Null);
    }
}
