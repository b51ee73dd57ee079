//! Provider event envelope parsing.

use serde_json::Value;

use crate::error::{Result, WebhookError};

/// A parsed provider event envelope.
///
/// Only the envelope fields needed for dispatch are pulled out; the full
/// payload is kept verbatim for the idempotency record.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
}

impl ProviderEvent {
    /// Parses a raw delivery body. The event id is the idempotency key, so
    /// a body without a string `id` is rejected outright.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|error| WebhookError::InvalidPayload(format!("body is not JSON: {error}")))?;

        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload("event has no string id".to_string()))?
            .to_string();
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookError::InvalidPayload("event has no string type".to_string()))?
            .to_string();

        Ok(Self {
            id,
            event_type,
            payload,
        })
    }

    /// The provider object the event is about (`data.object`), or `Null`
    /// when absent.
    pub fn object(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.payload
            .get("data")
            .and_then(|data| data.get("object"))
            .unwrap_or(&NULL)
    }
}
