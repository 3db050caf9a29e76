//! The JSON document SNS posts to the callback endpoint.
//!
//! Only the body's syntax is checked. Fields are read leniently: a field of
//! the wrong type is treated as absent, a repeated key keeps its last value,
//! and a body that is valid JSON but not an object has no fields at all.

use serde_json::{Map, Value};

/// Value of the envelope's `Type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageType {
    SubscriptionConfirmation,
    Notification,
    UnsubscribeConfirmation,
    /// Any other value, or no `Type` at all.
    #[default]
    Other,
}

impl MessageType {
    fn from_field(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("SubscriptionConfirmation") => Self::SubscriptionConfirmation,
            Some("Notification") => Self::Notification,
            Some("UnsubscribeConfirmation") => Self::UnsubscribeConfirmation,
            _ => Self::Other,
        }
    }
}

/// An inbound SNS envelope.
///
/// `Message` and `SubscribeURL` stay raw JSON so a non-string value is
/// reported where it is used rather than rejecting the whole envelope. The
/// remaining fields are kept for logging.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub kind: MessageType,
    pub message: Option<Value>,
    pub subscribe_url: Option<Value>,
    pub message_id: Option<String>,
    pub topic_arn: Option<String>,
    pub subject: Option<String>,
    pub timestamp: Option<String>,
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

impl Envelope {
    /// Parses a callback body. Fails only when the body is not JSON.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };
        Self {
            kind: MessageType::from_field(fields.get("Type")),
            message_id: text(&fields, "MessageId"),
            topic_arn: text(&fields, "TopicArn"),
            subject: text(&fields, "Subject"),
            timestamp: text(&fields, "Timestamp"),
            message: fields.remove("Message"),
            subscribe_url: fields.remove("SubscribeURL"),
        }
    }
}
