//! Message definitions for the broker
//!
//! `Message` is the immutable value handed to every subscriber. The broker
//! never interprets the payload beyond the routing metadata in its header:
//!
//! ```json
//! {
//!   "header": {
//!     "version": "4.0",
//!     "messageType": "Publish",
//!     "id": "6f1c...",
//!     "messageDescription": { "topic": "CarControl", "action": "SetPowerController", "replyToId": "..." }
//!   },
//!   "payload": { }
//! }
//! ```
//!
//! Notes on fields:
//! - `id`: taken from `header.id`; a v4 UUID is generated when absent
//! - `message_type`: `Publish` when absent, `Unknown` when unrecognised
//! - `topic` / `action`: empty when absent, which routes like the `*` wildcard
//! - `timestamp`: milliseconds since UNIX epoch, set when the message is created

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

/// Which way a message travels between the engine and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// platform -> engine
    Incoming,
    /// engine -> platform
    Outgoing,
}

impl Direction {
    /// The direction a reply to a message travelling this way takes.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Incoming => Direction::Outgoing,
            Direction::Outgoing => Direction::Incoming,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Incoming => f.write_str("INCOMING"),
            Direction::Outgoing => f.write_str("OUTGOING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Publish,
    Reply,
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    header: Header,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    id: Option<String>,
    message_type: Option<String>,
    #[serde(default)]
    message_description: MessageDescription,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDescription {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    reply_to_id: String,
}

#[derive(Debug, PartialEq, Eq)]
struct MessageInner {
    direction: Direction,
    message_type: MessageType,
    id: String,
    topic: String,
    action: String,
    reply_to: String,
    payload: String,
    timestamp: i64,
}

/// One broker event. Cloning is cheap; every clone shares the same contents.
///
/// `Message::invalid()` (also exposed as [`Message::INVALID`]) is the
/// "no message" result returned by every failed publish.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    inner: Option<Arc<MessageInner>>,
}

impl Message {
    pub const INVALID: Message = Message { inner: None };

    /// Builds a message from a serialized envelope travelling in `direction`.
    pub fn new(payload: impl Into<String>, direction: Direction) -> Self {
        let payload = payload.into();
        let (envelope, parsed) = match serde_json::from_str::<Envelope>(&payload) {
            Ok(envelope) => (envelope, true),
            Err(e) => {
                tracing::debug!(reason = %e, "unparseable message envelope");
                (Envelope::default(), false)
            }
        };

        let header = envelope.header;
        let message_type = match (parsed, header.message_type.as_deref()) {
            (false, _) => MessageType::Unknown,
            (true, None) | (true, Some("Publish")) => MessageType::Publish,
            (true, Some("Reply")) => MessageType::Reply,
            (true, Some(_)) => MessageType::Unknown,
        };
        let id = header
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let description = header.message_description;

        Self {
            inner: Some(Arc::new(MessageInner {
                direction,
                message_type,
                id,
                topic: description.topic,
                action: description.action,
                reply_to: description.reply_to_id,
                payload,
                timestamp: chrono::Utc::now().timestamp_millis(),
            })),
        }
    }

    pub fn invalid() -> Self {
        Self::INVALID
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Direction of the message; `INVALID` reports `Incoming`.
    pub fn direction(&self) -> Direction {
        self.inner
            .as_ref()
            .map(|m| m.direction)
            .unwrap_or(Direction::Incoming)
    }

    /// The direction a reply to this message travels.
    pub fn reply_direction(&self) -> Direction {
        self.direction().opposite()
    }

    pub fn message_type(&self) -> MessageType {
        self.inner
            .as_ref()
            .map(|m| m.message_type)
            .unwrap_or(MessageType::Unknown)
    }

    pub fn id(&self) -> &str {
        self.field(|m| &m.id)
    }

    pub fn topic(&self) -> &str {
        self.field(|m| &m.topic)
    }

    pub fn action(&self) -> &str {
        self.field(|m| &m.action)
    }

    /// Id of the message this one replies to; empty for publishes.
    pub fn reply_to(&self) -> &str {
        self.field(|m| &m.reply_to)
    }

    /// The serialized envelope exactly as it was published.
    pub fn payload(&self) -> &str {
        self.field(|m| &m.payload)
    }

    pub fn timestamp(&self) -> i64 {
        self.inner.as_ref().map(|m| m.timestamp).unwrap_or_default()
    }

    fn field<'a>(&'a self, get: impl Fn(&'a MessageInner) -> &'a String) -> &'a str {
        self.inner.as_deref().map(get).map_or("", String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(m) => write!(
                f,
                "{}:{}:{} id={} type={:?}",
                m.direction, m.topic, m.action, m.id, m.message_type
            ),
            None => f.write_str("INVALID"),
        }
    }
}
