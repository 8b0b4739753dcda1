//! Channel membership tracking for Parley.
//!
//! Membership is the set of identities currently in a channel. It is the
//! target list for every fan-out on that channel.

use crate::message::{now_millis, Identity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A single member entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Participant identity.
    pub identity: Identity,
    /// When the identity first joined, in milliseconds since the epoch.
    pub joined_at: u64,
}

/// The membership set of one channel.
#[derive(Debug, Default)]
pub struct Membership {
    members: HashMap<Identity, Member>,
}

impl Membership {
    /// Create an empty membership set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity.
    ///
    /// Returns `true` if it was newly added, `false` if already present.
    pub fn add(&mut self, identity: impl Into<Identity>) -> bool {
        let identity = identity.into();
        if self.members.contains_key(&identity) {
            return false;
        }

        debug!(identity = %identity, "Member added");
        self.members.insert(
            identity.clone(),
            Member {
                identity,
                joined_at: now_millis(),
            },
        );
        true
    }

    /// Remove an identity.
    ///
    /// Returns `true` if membership changed.
    pub fn remove(&mut self, identity: &str) -> bool {
        let removed = self.members.remove(identity).is_some();
        if removed {
            debug!(identity = %identity, "Member removed");
        }
        removed
    }

    /// Current member identities, in no particular order.
    #[must_use]
    pub fn members(&self) -> Vec<Identity> {
        self.members.keys().cloned().collect()
    }

    /// Whether `identity` is a member.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains_key(identity)
    }

    /// When `identity` joined, if it is a member.
    #[must_use]
    pub fn joined_at(&self, identity: &str) -> Option<u64> {
        self.members.get(identity).map(|m| m.joined_at)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
