//! User-activity event and its broker wire format.
//!
//! Wire format is a UTF-8 JSON object with exactly five fields:
//! `eventId`, `userId`, `eventType`, `timestamp` (RFC 3339) and `payload`
//! (JSON object, possibly empty).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Errors raised while encoding or decoding an event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Failed to serialize event: {0}")]
    Serialization(String),
}

/// Arbitrary structured data attached to an event.
pub type Payload = Map<String, Value>;

/// A single user-activity occurrence.
///
/// Immutable once constructed: fields are private and only exposed through
/// shared accessors. `event_id` is the sole identity; two events with the
/// same id are the same logical occurrence regardless of their other fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    event_id: String,
    user_id: String,
    event_type: String,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
    payload: Payload,
}

/// Decoding shape. Every field is optional so absence can be reported by name.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    event_id: Option<String>,
    user_id: Option<String>,
    event_type: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<Payload>,
}

impl ActivityEvent {
    /// Mint a new event stamped with the current time.
    pub fn new(
        event_id: impl Into<String>,
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self::with_timestamp(event_id, user_id, event_type, Utc::now(), payload)
    }

    /// Build an event with an explicit creation time.
    pub fn with_timestamp(
        event_id: impl Into<String>,
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: Payload,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            user_id: user_id.into(),
            event_type: event_type.into(),
            timestamp,
            payload,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Encode to the broker wire representation.
    pub fn to_wire(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Decode a delivered broker message.
    ///
    /// Rejects invalid JSON, a non-object `payload`, and missing or empty
    /// `eventId`, `userId`, `eventType` or `timestamp`. An absent or null
    /// `payload` decodes as an empty object.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, EventError> {
        let wire: WireEvent = serde_json::from_slice(bytes)?;

        Ok(Self {
            event_id: required(wire.event_id, "eventId")?,
            user_id: required(wire.user_id, "userId")?,
            event_type: required(wire.event_type, "eventType")?,
            timestamp: wire.timestamp.ok_or(EventError::MissingField("timestamp"))?,
            payload: wire.payload.unwrap_or_default(),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, EventError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EventError::MissingField(field)),
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}
