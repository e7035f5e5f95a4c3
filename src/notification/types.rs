use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::connection_manager::{ConnectionId, DocumentId, OutboundFrame};

/// Event type emitted when a connection joins a document
pub const USER_JOINED: &str = "user_joined";
/// Event type emitted when a connection leaves a document
pub const USER_LEFT: &str = "user_left";
/// Event type for error notices sent back to a notification client
pub const ERROR: &str = "error";
/// Greeting sent when a notification connection is accepted
pub const CONNECTED: &str = "connected";
/// Confirmation sent when a document is added to an interest set
pub const SUBSCRIBED: &str = "subscribed";

/// Structured event carried on the notification channel.
///
/// Wire shape: `{"type": <string>, "file_id": <int>, ...}`. Fields other
/// than `type` and `file_id` are preserved verbatim. Client frames may omit
/// `type` or carry a non-string one; such values stay in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<DocumentId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Why an inbound notification frame was rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventParseError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Notification must be a JSON object")]
    NotAnObject,
}

impl NotificationEvent {
    pub fn new(event_type: impl Into<String>, file_id: Option<DocumentId>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            file_id,
            fields: Map::new(),
        }
    }

    /// Attach an extra field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn user_joined(file_id: DocumentId) -> Self {
        Self::new(USER_JOINED, Some(file_id))
    }

    pub fn user_left(file_id: DocumentId) -> Self {
        Self::new(USER_LEFT, Some(file_id))
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(ERROR, None).with_field("message", message)
    }

    pub fn connected(file_id: DocumentId, connection_id: ConnectionId) -> Self {
        Self::new(CONNECTED, Some(file_id)).with_field("connection_id", connection_id.get())
    }

    pub fn subscribed(file_id: DocumentId) -> Self {
        Self::new(SUBSCRIBED, Some(file_id))
    }

    /// Parse a client frame, defaulting a missing or null `file_id` to
    /// `default_file_id`.
    ///
    /// Any JSON object is accepted. An integer-valued `file_id` (`5` or
    /// `5.0`) becomes the routing target; any other `file_id` value is kept
    /// verbatim in `fields` and leaves `file_id` unset, so the event matches
    /// no document.
    pub fn from_client_frame(text: &str, default_file_id: DocumentId) -> Result<Self, EventParseError> {
        let value: Value = serde_json::from_str(text).map_err(|_| EventParseError::InvalidJson)?;
        let Value::Object(mut fields) = value else {
            return Err(EventParseError::NotAnObject);
        };

        let event_type = match fields.remove("type") {
            Some(Value::String(event_type)) => Some(event_type),
            Some(other) => {
                fields.insert("type".to_string(), other);
                None
            }
            None => None,
        };

        let file_id = match fields.remove("file_id") {
            None | Some(Value::Null) => Some(default_file_id),
            Some(value) => match integral_document_id(&value) {
                Some(id) => Some(id),
                None => {
                    fields.insert("file_id".to_string(), value);
                    None
                }
            },
        };

        Ok(Self {
            event_type,
            file_id,
            fields,
        })
    }

    /// Event type for logging; empty when the frame carried none
    pub fn kind(&self) -> &str {
        self.event_type.as_deref().unwrap_or_default()
    }

    /// Serialize once into a frame shareable by every recipient
    pub fn to_frame(&self) -> Result<OutboundFrame, serde_json::Error> {
        serde_json::to_string(self).map(OutboundFrame::text)
    }
}

/// `5` and `5.0` name document 5; `5.5`, strings and out-of-range numbers name none
fn integral_document_id(value: &Value) -> Option<DocumentId> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    let float = value.as_f64()?;
    let in_range = float >= DocumentId::MIN as f64 && float < DocumentId::MAX as f64;
    (float.fract() == 0.0 && in_range).then_some(float as DocumentId)
}
