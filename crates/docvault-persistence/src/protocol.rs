//! Request and response messages exchanged with the worker.
//!
//! Inbound messages are JSON objects tagged by a string `type` field:
//!
//! ```text
//! { "type": "save", ...any other fields }
//! { "type": "load" }
//! ```
//!
//! A save persists the *entire* envelope, `type` field included. Outbound
//! messages are either the loaded document text as a bare JSON string, or an
//! error object:
//!
//! ```text
//! "{\"type\":\"save\",\"name\":\"Ada\"}"
//! { "type": "error", "request": "load", "kind": "read_failure", "message": "..." }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, PersistenceError, Result};

/// Discriminant of a save request.
pub const SAVE: &str = "save";
/// Discriminant of a load request.
pub const LOAD: &str = "load";

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Persist the contained envelope as the document.
    Save(Value),
    /// Read back the stored document.
    Load,
}

impl Request {
    /// Parse a raw message by its `type` field.
    pub fn from_message(message: Value) -> Result<Self> {
        match message_type(&message) {
            Some(SAVE) => Ok(Self::Save(message)),
            Some(LOAD) => Ok(Self::Load),
            Some(other) => Err(PersistenceError::Protocol {
                reason: format!("unknown request type `{other}`"),
            }),
            None => Err(PersistenceError::Protocol {
                reason: "message has no string `type` field".to_string(),
            }),
        }
    }

    /// Build a save envelope from document fields.
    ///
    /// Any `type` field already present is overwritten.
    pub fn save_envelope(mut fields: Map<String, Value>) -> Value {
        fields.insert("type".to_string(), Value::from(SAVE));
        Value::Object(fields)
    }

    /// Build a load envelope.
    pub fn load_envelope() -> Value {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::from(LOAD));
        Value::Object(fields)
    }
}

/// The `type` field of a raw message, if it is a string.
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Text of the stored document (empty if nothing was saved).
    Loaded(String),
    /// A request failed.
    Error(ErrorResponse),
}

/// Failure report for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorResponse {
    /// `type` of the failed request, or `"unknown"` if it had none.
    pub request: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(request: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            kind,
            message: message.into(),
        }
    }

    /// Report `error`, with its chain of causes appended to the message.
    pub fn from_error(request: impl Into<String>, error: &PersistenceError) -> Self {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(request, error.kind(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_keeps_whole_envelope() {
        let message = json!({"type": "save", "name": "Ada", "age": 36});
        let request = Request::from_message(message.clone()).unwrap();
        assert_eq!(request, Request::Save(message));
    }

    #[test]
    fn test_load_ignores_extra_fields() {
        let request = Request::from_message(json!({"type": "load", "x": 1})).unwrap();
        assert_eq!(request, Request::Load);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = Request::from_message(json!({"type": "delete"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.to_string(), "Invalid request: unknown request type `delete`");
    }

    #[test]
    fn test_missing_or_non_string_type_is_rejected() {
        for message in [json!({"name": "Ada"}), json!({"type": 3}), json!("load")] {
            assert!(Request::from_message(message).is_err());
        }
    }

    #[test]
    fn test_save_envelope_overwrites_type() {
        let mut fields = Map::new();
        fields.insert("type".to_string(), json!("load"));
        fields.insert("name".to_string(), json!("Ada"));

        let envelope = Request::save_envelope(fields);
        assert_eq!(envelope, json!({"type": "save", "name": "Ada"}));
        assert_eq!(Request::load_envelope(), json!({"type": "load"}));
    }

    #[test]
    fn test_loaded_response_wire_format() {
        let response = Response::Loaded(r#"{"type":"save"}"#.to_string());
        insta::assert_snapshot!(
            serde_json::to_string(&response).unwrap(),
            @r#""{\"type\":\"save\"}""#
        );
    }

    #[test]
    fn test_error_response_wire_format() {
        let err = Request::from_message(json!({"type": "delete"})).unwrap_err();
        let response = Response::Error(ErrorResponse::from_error("delete", &err));
        insta::assert_snapshot!(
            serde_json::to_string(&response).unwrap(),
            @r#"{"type":"error","request":"delete","kind":"protocol","message":"Invalid request: unknown request type `delete`"}"#
        );
    }

    #[test]
    fn test_error_response_message_includes_cause() {
        let err = PersistenceError::WriteFailure {
            operation: "write",
            path: std::path::PathBuf::from("bad/PatientData.txt"),
            source: std::io::Error::other("disk full"),
        };
        let response = ErrorResponse::from_error("save", &err);
        assert_eq!(response.kind, ErrorKind::WriteFailure);
        assert_eq!(
            response.message,
            "Failed to write document: bad/PatientData.txt: disk full"
        );
    }

    #[test]
    fn test_response_parses_back() {
        let loaded: Response = serde_json::from_str(r#""""#).unwrap();
        assert_eq!(loaded, Response::Loaded(String::new()));

        let error: Response = serde_json::from_str(
            r#"{"type":"error","request":"load","kind":"read_failure","message":"boom"}"#,
        )
        .unwrap();
        assert_eq!(
            error,
            Response::Error(ErrorResponse::new("load", ErrorKind::ReadFailure, "boom"))
        );
    }
}
