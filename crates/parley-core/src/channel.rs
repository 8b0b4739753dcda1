//! Channel abstraction for Parley.
//!
//! A channel is a named room holding its membership and recent history.

use crate::history::MessageHistory;
use crate::membership::Membership;
use crate::message::{ChatMessage, Identity};
use serde::{Deserialize, Serialize};

/// A channel identifier.
pub type ChannelId = String;

/// A chat channel.
#[derive(Debug)]
pub struct Channel {
    name: ChannelId,
    history: MessageHistory,
    membership: Membership,
}

impl Channel {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self::with_history(name, MessageHistory::new())
    }

    /// Create a new channel with a specific history capacity.
    #[must_use]
    pub fn with_history_capacity(name: impl Into<ChannelId>, capacity: usize) -> Self {
        Self::with_history(name, MessageHistory::with_capacity(capacity))
    }

    fn with_history(name: impl Into<ChannelId>, history: MessageHistory) -> Self {
        Self {
            name: name.into(),
            history,
            membership: Membership::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Message history.
    #[must_use]
    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Mutable message history.
    pub fn history_mut(&mut self) -> &mut MessageHistory {
        &mut self.history
    }

    /// Membership set.
    #[must_use]
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Mutable membership set.
    pub fn membership_mut(&mut self) -> &mut Membership {
        &mut self.membership
    }

    /// Take a detached copy of this channel's state.
    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            name: self.name.clone(),
            history: self.history.snapshot(),
            members: self.membership.members(),
        }
    }
}

/// Point-in-time copy of a channel, used to render a freshly entered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel name.
    pub name: ChannelId,
    /// Retained messages, oldest first.
    pub history: Vec<ChatMessage>,
    /// Current members, in no particular order.
    pub members: Vec<Identity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new("general");
        assert_eq!(channel.name(), "general");
        assert!(channel.membership().is_empty());
        assert!(channel.history().is_empty());
    }

    #[test]
    fn test_snapshot_detached() {
        let mut channel = Channel::with_history_capacity("general", 10);
        channel.membership_mut().add("alice");
        channel
            .history_mut()
            .append(ChatMessage::new("1", "alice", "hello"));

        let snapshot = channel.snapshot();
        channel.membership_mut().remove("alice");

        assert_eq!(snapshot.members, vec!["alice"]);
        assert_eq!(snapshot.history.len(), 1);
        assert!(channel.membership().is_empty());
    }
}
