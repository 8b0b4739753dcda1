//! Broadcast hub for Parley.
//!
//! The hub turns inbound join/leave/message events into channel state changes
//! and fans the resulting event out to every member of the channel. State is
//! mutated and the member list captured under the channel lock; delivery runs
//! after the lock is released.

use crate::channel::{ChannelId, ChannelSnapshot};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::message::{ChannelEvent, ChatMessage, Identity};
use crate::registry::{lock_channel, ChannelRegistry, RegistryError, RegistryStats};
use crate::sink::{DeliveryError, EventSink};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of channels. Unbounded unless set.
    pub max_channels: usize,
    /// Messages retained per channel.
    pub history_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_channels: usize::MAX,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone)]
pub struct Fanout {
    /// The event that was broadcast.
    pub event: Arc<ChannelEvent>,
    /// Members captured when the event was applied.
    pub targets: Vec<Identity>,
    /// Number of successful deliveries.
    pub delivered: usize,
    /// Recipients that could not be reached.
    pub failures: Vec<(Identity, DeliveryError)>,
}

impl Fanout {
    /// Whether every target received the event.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The broadcast hub.
///
/// Owns the channel registry and the table of per-participant sinks. The
/// connection layer holds one hub for the life of the process and supplies the
/// participant's current channel on every call.
pub struct BroadcastHub {
    registry: ChannelRegistry,
    /// Delivery sinks indexed by identity.
    sinks: DashMap<Identity, Arc<dyn EventSink>>,
}

impl BroadcastHub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating broadcast hub with config: {:?}", config);
        Self {
            registry: ChannelRegistry::with_limits(config.max_channels, config.history_capacity),
            sinks: DashMap::new(),
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Register the delivery sink for `identity`, replacing any previous one.
    pub fn attach(&self, identity: impl Into<Identity>, sink: Arc<dyn EventSink>) {
        let identity = identity.into();
        debug!(identity = %identity, "Sink attached");
        self.sinks.insert(identity, sink);
    }

    /// Register the delivery sink for `identity` only if none is attached.
    ///
    /// Returns `false` and drops `sink` if the identity already has one.
    pub fn try_attach(&self, identity: impl Into<Identity>, sink: Arc<dyn EventSink>) -> bool {
        match self.sinks.entry(identity.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!(identity = %entry.key(), "Sink attached");
                entry.insert(sink);
                true
            }
        }
    }

    /// Remove the delivery sink for `identity`.
    ///
    /// Returns `true` if a sink was attached.
    pub fn detach(&self, identity: &str) -> bool {
        let removed = self.sinks.remove(identity).is_some();
        if removed {
            debug!(identity = %identity, "Sink detached");
        }
        removed
    }

    /// Whether `identity` has a sink attached.
    #[must_use]
    pub fn is_attached(&self, identity: &str) -> bool {
        self.sinks.contains_key(identity)
    }

    /// Create a channel.
    ///
    /// # Errors
    ///
    /// See [`ChannelRegistry::create_channel`].
    pub fn create_channel(&self, name: &str) -> Result<(), RegistryError> {
        self.registry.create_channel(name)
    }

    /// Channel names in creation order.
    #[must_use]
    pub fn list_channels(&self) -> Vec<ChannelId> {
        self.registry.list_channels()
    }

    /// Snapshot a channel's history and membership for an initial view.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn enter_channel(&self, name: &str) -> Result<ChannelSnapshot, RegistryError> {
        let channel = self.registry.get_channel(name)?;
        let snapshot = lock_channel(&channel).snapshot();
        Ok(snapshot)
    }

    /// Add `identity` to `channel` and notify every member, the joiner included.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn on_join(&self, channel: &str, identity: &str) -> Result<Fanout, RegistryError> {
        let shared = self.registry.get_channel(channel)?;
        let targets = {
            let mut state = lock_channel(&shared);
            state.membership_mut().add(identity);
            state.membership().members()
        };

        debug!(channel = %channel, identity = %identity, members = targets.len(), "Joined");
        Ok(self.fan_out(channel, ChannelEvent::joined(identity, channel), targets))
    }

    /// Remove `identity` from `channel` and notify the remaining members.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn on_leave(&self, channel: &str, identity: &str) -> Result<Fanout, RegistryError> {
        let shared = self.registry.get_channel(channel)?;
        let targets = {
            let mut state = lock_channel(&shared);
            state.membership_mut().remove(identity);
            state.membership().members()
        };

        debug!(channel = %channel, identity = %identity, members = targets.len(), "Left");
        Ok(self.fan_out(channel, ChannelEvent::left(identity, channel), targets))
    }

    /// Record a message in `channel` and announce it to every member, the
    /// sender included.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if the channel does not exist.
    pub fn on_message(
        &self,
        channel: &str,
        identity: &str,
        body: &str,
        timestamp: &str,
    ) -> Result<Fanout, RegistryError> {
        let shared = self.registry.get_channel(channel)?;
        let message = ChatMessage::new(timestamp, identity, body);
        let event = ChannelEvent::announce(&message);
        let targets = {
            let mut state = lock_channel(&shared);
            state.history_mut().append(message);
            state.membership().members()
        };

        Ok(self.fan_out(channel, event, targets))
    }

    /// Tear down a participant whose connection ended.
    ///
    /// Leaves `current_channel` (if any) and detaches the sink. The sink is
    /// detached even if the channel lookup fails.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ChannelNotFound`] if `current_channel` does not exist.
    pub fn disconnect(
        &self,
        identity: &str,
        current_channel: Option<&str>,
    ) -> Result<Option<Fanout>, RegistryError> {
        let result = match current_channel {
            Some(channel) => self.on_leave(channel, identity).map(Some),
            None => Ok(None),
        };
        self.detach(identity);
        result
    }

    /// Hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            registry: self.registry.stats(),
            attached_sinks: self.sinks.len(),
        }
    }

    /// Deliver `event` to each target independently.
    fn fan_out(&self, channel: &str, event: ChannelEvent, targets: Vec<Identity>) -> Fanout {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut failures = Vec::new();

        for target in &targets {
            // Clone the sink out so no map shard stays locked during delivery
            let sink = self.sinks.get(target).map(|entry| Arc::clone(entry.value()));
            let result = match sink {
                Some(sink) => sink.deliver(Arc::clone(&event)),
                None => Err(DeliveryError::NoSink),
            };

            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(channel = %channel, recipient = %target, error = %e, "Delivery failed");
                    failures.push((target.clone(), e));
                }
            }
        }

        trace!(
            channel = %channel,
            targets = targets.len(),
            delivered,
            failed = failures.len(),
            "Fan-out complete"
        );

        Fanout {
            event,
            targets,
            delivered,
            failures,
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Channel registry statistics.
    pub registry: RegistryStats,
    /// Number of attached sinks.
    pub attached_sinks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    type Inbox = mpsc::UnboundedReceiver<Arc<ChannelEvent>>;

    fn connect(hub: &BroadcastHub, identity: &str) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel::<Arc<ChannelEvent>>();
        hub.attach(identity, Arc::new(tx));
        rx
    }

    fn drain(inbox: &mut Inbox) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    fn sorted(mut ids: Vec<Identity>) -> Vec<Identity> {
        ids.sort();
        ids
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn deliver(&self, _event: Arc<ChannelEvent>) -> Result<(), DeliveryError> {
            Err(DeliveryError::Closed)
        }
    }

    #[test]
    fn test_join_message_leave() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let mut alice = connect(&hub, "A");

        let join = hub.on_join("general", "A").unwrap();
        assert_eq!(join.targets, vec!["A"]);
        assert_eq!(hub.enter_channel("general").unwrap().members, vec!["A"]);

        let message = hub.on_message("general", "A", "M", "1").unwrap();
        assert_eq!(message.targets, vec!["A"]);
        let snapshot = hub.enter_channel("general").unwrap();
        assert_eq!(snapshot.history, vec![ChatMessage::new("1", "A", "M")]);

        let leave = hub.on_leave("general", "A").unwrap();
        assert!(leave.targets.is_empty());
        assert!(hub.enter_channel("general").unwrap().members.is_empty());

        // Joiner sees its own join and its own message, not its leave
        assert_eq!(
            drain(&mut alice),
            vec![
                ChannelEvent::joined("A", "general"),
                ChannelEvent::Announce {
                    identity: "A".into(),
                    timestamp: "1".into(),
                    body: "M".into(),
                },
            ]
        );
    }

    #[test]
    fn test_join_notifies_existing_members() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let mut alice = connect(&hub, "alice");
        let mut bob = connect(&hub, "bob");

        hub.on_join("general", "alice").unwrap();
        drain(&mut alice);

        let fanout = hub.on_join("general", "bob").unwrap();
        assert_eq!(sorted(fanout.targets), vec!["alice", "bob"]);
        assert_eq!(fanout.delivered, 2);
        assert_eq!(drain(&mut alice), vec![ChannelEvent::joined("bob", "general")]);
        assert_eq!(drain(&mut bob), vec![ChannelEvent::joined("bob", "general")]);

        hub.on_leave("general", "bob").unwrap();
        assert_eq!(drain(&mut alice), vec![ChannelEvent::left("bob", "general")]);
        assert!(drain(&mut bob).is_empty());
    }

    #[test]
    fn test_repeat_join_does_not_duplicate_member() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let _alice = connect(&hub, "alice");

        hub.on_join("general", "alice").unwrap();
        let again = hub.on_join("general", "alice").unwrap();
        assert_eq!(again.targets, vec!["alice"]);
    }

    #[test]
    fn test_unknown_channel_has_no_side_effects() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();

        assert!(matches!(
            hub.on_message("nowhere", "alice", "hi", "1"),
            Err(RegistryError::ChannelNotFound(_))
        ));
        assert!(matches!(
            hub.on_join("nowhere", "alice"),
            Err(RegistryError::ChannelNotFound(_))
        ));
        assert!(matches!(
            hub.on_leave("nowhere", "alice"),
            Err(RegistryError::ChannelNotFound(_))
        ));
        assert!(matches!(
            hub.enter_channel("nowhere"),
            Err(RegistryError::ChannelNotFound(_))
        ));

        assert!(hub.enter_channel("general").unwrap().history.is_empty());
        assert_eq!(hub.list_channels(), vec!["general"]);
    }

    #[test]
    fn test_failed_delivery_is_isolated() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        hub.attach("broken", Arc::new(FailingSink));
        let mut alice = connect(&hub, "alice");

        hub.on_join("general", "broken").unwrap();
        hub.on_join("general", "alice").unwrap();
        hub.on_join("general", "ghost").unwrap(); // never attached
        drain(&mut alice);

        let fanout = hub.on_message("general", "alice", "hello", "1").unwrap();
        assert_eq!(fanout.delivered, 1);
        assert!(!fanout.is_complete());

        let mut failures = fanout.failures.clone();
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            failures,
            vec![
                ("broken".to_string(), DeliveryError::Closed),
                ("ghost".to_string(), DeliveryError::NoSink),
            ]
        );

        // The message is recorded regardless
        assert_eq!(hub.enter_channel("general").unwrap().history.len(), 1);
        assert_eq!(drain(&mut alice).len(), 1);
    }

    #[test]
    fn test_disconnect_leaves_and_detaches() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let mut alice = connect(&hub, "alice");
        let _bob = connect(&hub, "bob");
        hub.on_join("general", "alice").unwrap();
        hub.on_join("general", "bob").unwrap();
        drain(&mut alice);

        let fanout = hub.disconnect("bob", Some("general")).unwrap().unwrap();
        assert_eq!(fanout.targets, vec!["alice"]);
        assert!(!hub.is_attached("bob"));
        assert_eq!(drain(&mut alice), vec![ChannelEvent::left("bob", "general")]);

        assert!(hub.disconnect("alice", None).unwrap().is_none());
        assert!(!hub.is_attached("alice"));

        // A stale channel name still releases the sink
        let _carol = connect(&hub, "carol");
        assert!(hub.disconnect("carol", Some("gone")).is_err());
        assert!(!hub.is_attached("carol"));
    }

    #[test]
    fn test_history_cap_through_hub() {
        let hub = BroadcastHub::with_config(HubConfig {
            max_channels: 4,
            history_capacity: 3,
        });
        hub.create_channel("general").unwrap();

        for i in 0..5 {
            hub.on_message("general", "alice", &format!("m{i}"), &i.to_string())
                .unwrap();
        }

        let bodies: Vec<_> = hub
            .enter_channel("general")
            .unwrap()
            .history
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_concurrent_joins_are_not_lost() {
        let hub = Arc::new(BroadcastHub::new());
        hub.create_channel("new").unwrap();

        let handles: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|identity| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || hub.on_join("new", identity).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let members = sorted(hub.enter_channel("new").unwrap().members);
        assert_eq!(members, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_concurrent_messages_from_tasks() {
        let hub = Arc::new(BroadcastHub::new());
        hub.create_channel("busy").unwrap();
        let mut watcher = connect(&hub, "watcher");
        hub.on_join("busy", "watcher").unwrap();
        drain(&mut watcher);

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    hub.on_message("busy", &format!("user-{i}"), "hi", "0").unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(drain(&mut watcher).len(), 10);
        assert_eq!(hub.enter_channel("busy").unwrap().history.len(), 10);
    }

    #[test]
    fn test_try_attach_keeps_existing_sink() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let (first, mut first_rx) = mpsc::unbounded_channel::<Arc<ChannelEvent>>();
        let (second, mut second_rx) = mpsc::unbounded_channel::<Arc<ChannelEvent>>();

        assert!(hub.try_attach("alice", Arc::new(first)));
        assert!(!hub.try_attach("alice", Arc::new(second)));

        hub.on_join("general", "alice").unwrap();
        assert_eq!(drain(&mut first_rx).len(), 1);
        assert!(drain(&mut second_rx).is_empty());
    }

    #[test]
    fn test_default_hub_only_rejects_duplicates() {
        let hub = BroadcastHub::new();
        for i in 0..10_001 {
            hub.create_channel(&format!("room-{i}")).unwrap();
        }
        for name in ["", "a/b", "tab\there"] {
            hub.create_channel(name).unwrap();
        }

        assert_eq!(
            hub.create_channel("room-7"),
            Err(RegistryError::DuplicateChannel("room-7".into()))
        );
        assert_eq!(hub.create_channel(""), Err(RegistryError::DuplicateChannel(String::new())));
        assert_eq!(hub.list_channels().len(), 10_004);
    }

    #[test]
    fn test_stats() {
        let hub = BroadcastHub::new();
        hub.create_channel("general").unwrap();
        let _alice = connect(&hub, "alice");
        hub.on_join("general", "alice").unwrap();
        hub.on_message("general", "alice", "hi", "1").unwrap();

        let stats = hub.stats();
        assert_eq!(stats.registry.channel_count, 1);
        assert_eq!(stats.registry.total_members, 1);
        assert_eq!(stats.registry.total_messages, 1);
        assert_eq!(stats.attached_sinks, 1);
    }
}
