//! The tsserver message model
//!
//! tsserver speaks its own correlated protocol, not JSON-RPC: requests carry
//! a client-assigned `seq`, responses echo it back as `request_seq`, and the
//! server pushes `event` messages that were never asked for. Every message
//! is tagged by a `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number correlating a request with its response.
pub type Seq = u32;

/// A message on the tsserver channel, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl Message {
    /// The `seq` this message answers, if it is a response.
    pub fn request_seq(&self) -> Option<Seq> {
        match self {
            Message::Response(response) => Some(response.request_seq),
            _ => None,
        }
    }
}

/// An outgoing command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    pub fn new(seq: Seq, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
        }
    }
}

/// The server's answer to a single request.
///
/// `success: false` carries a human-readable `message`; a successful
/// response may still omit `body` (an empty result, not an error).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub seq: Seq,
    /// Spelled `request_seq` on the wire, the one snake_case field in the
    /// protocol.
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A server-initiated push message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Event names the engine reacts to. Anything else is logged and dropped.
pub mod event_names {
    pub const SYNTAX_DIAG: &str = "syntaxDiag";
    pub const SEMANTIC_DIAG: &str = "semanticDiag";
    pub const SUGGESTION_DIAG: &str = "suggestionDiag";
    pub const REQUEST_COMPLETED: &str = "requestCompleted";
    pub const PROJECT_LOADING_START: &str = "projectLoadingStart";
    pub const PROJECT_LOADING_FINISH: &str = "projectLoadingFinish";
    pub const PROJECTS_UPDATED_IN_BACKGROUND: &str = "projectsUpdatedInBackground";
    pub const TYPES_INSTALLER_INITIALIZATION_FAILED: &str = "typesInstallerInitializationFailed";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let request = Request::new(7, "quickinfo", Some(json!({"file": "/p/a.ts"})));
        let wire = serde_json::to_value(Message::Request(request.clone())).unwrap();
        assert_eq!(wire["type"], "request");
        assert_eq!(wire["seq"], 7);
        assert_eq!(wire["command"], "quickinfo");

        let parsed: Message = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, Message::Request(request));
    }

    #[test]
    fn test_response_parses_without_body() {
        let wire = json!({
            "seq": 0,
            "type": "response",
            "request_seq": 3,
            "command": "configure",
            "success": true,
        });
        let parsed: Message = serde_json::from_value(wire).unwrap();
        match parsed {
            Message::Response(response) => {
                assert_eq!(response.request_seq, 3);
                assert!(response.success);
                assert!(response.body.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_event_parses() {
        let wire = json!({
            "type": "event",
            "event": "requestCompleted",
            "body": {"request_seq": 42},
        });
        let parsed: Message = serde_json::from_value(wire).unwrap();
        match parsed {
            Message::Event(event) => {
                assert_eq!(event.event, event_names::REQUEST_COMPLETED);
                assert_eq!(event.body.unwrap()["request_seq"], 42);
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_error_response_carries_message() {
        let wire = json!({
            "seq": 0,
            "type": "response",
            "request_seq": 9,
            "command": "rename",
            "success": false,
            "message": "Could not find source file",
        });
        let parsed: Message = serde_json::from_value(wire).unwrap();
        match parsed {
            Message::Response(response) => {
                assert!(!response.success);
                assert_eq!(
                    response.message.as_deref(),
                    Some("Could not find source file")
                );
            }
            other => panic!("expected response, got {other:?}"),
        }
    }
}
