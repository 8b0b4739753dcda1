//! Channel registry for Parley.
//!
//! The registry owns every channel for the lifetime of the process. Lookups go
//! through a concurrent map; creation order is kept separately for listing.

use crate::channel::{Channel, ChannelId};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// A channel shared between the registry and its users.
pub type SharedChannel = Arc<Mutex<Channel>>;

/// Lock a shared channel.
///
/// A panic while holding the lock cannot leave a channel half-updated, so a
/// poisoned lock is recovered rather than propagated.
pub fn lock_channel(channel: &SharedChannel) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A channel with this name already exists.
    #[error("Channel already exists: {0}")]
    DuplicateChannel(String),

    /// Channel not found.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Maximum channels reached.
    #[error("Maximum channels reached")]
    MaxChannelsReached,
}

/// The set of all channels.
#[derive(Debug)]
pub struct ChannelRegistry {
    /// Channels indexed by name.
    channels: DashMap<ChannelId, SharedChannel>,
    /// Channel names in creation order.
    order: Mutex<Vec<ChannelId>>,
    max_channels: usize,
    history_capacity: usize,
}

impl ChannelRegistry {
    /// Create a registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(usize::MAX, DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a registry with a channel cap and per-channel history capacity.
    #[must_use]
    pub fn with_limits(max_channels: usize, history_capacity: usize) -> Self {
        info!(max_channels, history_capacity, "Creating channel registry");
        Self {
            channels: DashMap::new(),
            order: Mutex::new(Vec::new()),
            max_channels,
            history_capacity,
        }
    }

    fn order(&self) -> MutexGuard<'_, Vec<ChannelId>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty channel.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateChannel`] if the name is taken, or
    /// [`RegistryError::MaxChannelsReached`] if a cap was configured and is hit.
    pub fn create_channel(&self, name: &str) -> Result<(), RegistryError> {
        // Creation is serialized on the order list so the cap and the
        // listing never disagree with the map.
        let mut order = self.order();
        if order.len() >= self.max_channels {
            return Err(RegistryError::MaxChannelsReached);
        }

        match self.channels.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateChannel(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(Channel::with_history_capacity(
                    name,
                    self.history_capacity,
                ))));
                order.push(name.to_string());
                debug!(channel = %name, "Channel created");
                Ok(())
            }
        }
    }

    /// Channel names in creation order.
    #[must_use]
    pub fn list_channels(&self) -> Vec<ChannelId> {
        self.order().clone()
    }

    /// Look up a channel.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if no such channel exists.
    pub fn get_channel(&self, name: &str) -> Result<SharedChannel, RegistryError> {
        self.channels
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::ChannelNotFound(name.to_string()))
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Per-channel history capacity.
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let channels: Vec<SharedChannel> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut stats = RegistryStats {
            channel_count: channels.len(),
            ..RegistryStats::default()
        };
        for channel in &channels {
            let channel = lock_channel(channel);
            stats.total_members += channel.membership().len();
            stats.total_messages += channel.history().len();
        }
        stats
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of channels.
    pub channel_count: usize,
    /// Sum of members across channels.
    pub total_members: usize,
    /// Sum of retained messages across channels.
    pub total_messages: usize,
}
