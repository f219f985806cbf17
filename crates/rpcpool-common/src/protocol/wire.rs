//! Records exchanged between the dispatch server and its actors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::jsonrpc::{Outcome, Response, RpcError, JSONRPC_VERSION};

/// Server-assigned sequence number correlating an actor reply with the
/// waiting HTTP caller.
pub type MessageSeq = u64;

/// Command sent from the dispatch server to an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    #[serde(rename = "messageSeq")]
    pub message_seq: MessageSeq,
    pub command_name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Reply from an actor: a response envelope keyed by `messageSeq` plus
/// timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorReply {
    pub jsonrpc: String,
    pub id: MessageSeq,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Which actor and process produced the reply
    pub pid: String,
    /// Milliseconds spent executing the command
    pub performance: f64,
    #[serde(default, rename = "actorTracking")]
    pub actor_tracking: u64,
}

impl ActorReply {
    pub fn new(
        message_seq: MessageSeq,
        result: std::result::Result<Value, RpcError>,
        pid: impl Into<String>,
        performance: f64,
    ) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Result(value),
            Err(err) => Outcome::Error(err),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: message_seq,
            outcome,
            pid: pid.into(),
            performance,
            actor_tracking: 0,
        }
    }

    pub fn with_tracking(mut self, actor_tracking: u64) -> Self {
        self.actor_tracking = actor_tracking;
        self
    }

    /// The bare response envelope, without metadata.
    pub fn into_response(self) -> Response {
        Response {
            jsonrpc: self.jsonrpc,
            id: Value::from(self.id),
            outcome: self.outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_record_wire_names() {
        let record = DispatchRecord {
            message_seq: 12,
            command_name: "hello-world".into(),
            args: vec!["x".into()],
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"messageSeq": 12, "command_name": "hello-world", "args": ["x"]})
        );
    }

    #[test]
    fn test_reply_carries_metadata_beside_result() {
        let reply = ActorReply::new(4, Ok(json!("hi")), "actor(1) at process: 10", 2.5);
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["id"], json!(4));
        assert_eq!(value["result"], json!("hi"));
        assert_eq!(value["pid"], json!("actor(1) at process: 10"));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_reply_error_parses() {
        let raw = r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32603,"message":"Internal error: boom"},"pid":"p","performance":0.1}"#;
        let reply: ActorReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.id, 9);
        assert_eq!(reply.actor_tracking, 0);
        assert!(!reply.into_response().is_success());
    }
}
