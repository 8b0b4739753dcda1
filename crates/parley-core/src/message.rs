//! Chat message and outbound event types for Parley.
//!
//! Messages are immutable once accepted into a channel's history. Events are
//! what the hub hands to each recipient's sink during fan-out.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A participant identity, chosen at login.
pub type Identity = String;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A message retained in a channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Caller-supplied timestamp, kept verbatim.
    pub timestamp: String,
    /// Identity of the sender.
    pub author: Identity,
    /// Message text.
    pub body: String,
}

impl ChatMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(
        timestamp: impl Into<String>,
        author: impl Into<Identity>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            author: author.into(),
            body: body.into(),
        }
    }
}

/// An event delivered to the members of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A membership change notice.
    Status {
        /// The identity that joined or left.
        identity: Identity,
        /// The channel the change happened in.
        channel: String,
        /// Human-readable note, e.g. `"alice joined"`.
        note: String,
    },

    /// A chat message announcement.
    Announce {
        /// The sender.
        identity: Identity,
        /// Caller-supplied timestamp.
        timestamp: String,
        /// Message text.
        body: String,
    },
}

impl ChannelEvent {
    /// Build the notice for `identity` joining `channel`.
    #[must_use]
    pub fn joined(identity: &str, channel: &str) -> Self {
        ChannelEvent::Status {
            identity: identity.to_string(),
            channel: channel.to_string(),
            note: format!("{identity} joined"),
        }
    }

    /// Build the notice for `identity` leaving `channel`.
    #[must_use]
    pub fn left(identity: &str, channel: &str) -> Self {
        ChannelEvent::Status {
            identity: identity.to_string(),
            channel: channel.to_string(),
            note: format!("{identity} left"),
        }
    }

    /// Build the announcement for an accepted message.
    #[must_use]
    pub fn announce(message: &ChatMessage) -> Self {
        ChannelEvent::Announce {
            identity: message.author.clone(),
            timestamp: message.timestamp.clone(),
            body: message.body.clone(),
        }
    }

    /// The identity that caused this event.
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            ChannelEvent::Status { identity, .. } | ChannelEvent::Announce { identity, .. } => {
                identity
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_notes() {
        match ChannelEvent::joined("alice", "general") {
            ChannelEvent::Status { note, channel, .. } => {
                assert_eq!(note, "alice joined");
                assert_eq!(channel, "general");
            }
            other => panic!("unexpected event {:?}", other),
        }

        match ChannelEvent::left("bob", "general") {
            ChannelEvent::Status { note, .. } => assert_eq!(note, "bob left"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_announce_from_message() {
        let msg = ChatMessage::new("12:00", "alice", "hi");
        let event = ChannelEvent::announce(&msg);
        assert_eq!(event.identity(), "alice");
        assert_eq!(
            event,
            ChannelEvent::Announce {
                identity: "alice".into(),
                timestamp: "12:00".into(),
                body: "hi".into(),
            }
        );
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let value = serde_json::to_value(ChannelEvent::joined("alice", "general")).unwrap();
        assert_eq!(value["kind"], "status");
        assert_eq!(value["note"], "alice joined");
    }
}
