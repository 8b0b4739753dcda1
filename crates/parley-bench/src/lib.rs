//! Shared fixtures for the Parley benchmarks.

use parley_core::{BroadcastHub, ChannelEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving half of a participant's sink.
pub type Inbox = mpsc::UnboundedReceiver<Arc<ChannelEvent>>;

/// Build a hub with one channel joined by `members` participants.
///
/// Participants are named `user-0`, `user-1`, ...; their inboxes are returned
/// in the same order and must be kept alive for deliveries to succeed.
#[must_use]
pub fn populated_hub(channel: &str, members: usize) -> (BroadcastHub, Vec<Inbox>) {
    let hub = BroadcastHub::new();
    hub.create_channel(channel)
        .unwrap_or_else(|e| panic!("fixture channel: {e}"));

    let inboxes = (0..members)
        .map(|i| {
            let identity = format!("user-{i}");
            let (tx, rx) = mpsc::unbounded_channel::<Arc<ChannelEvent>>();
            hub.attach(identity.as_str(), Arc::new(tx));
            hub.on_join(channel, &identity)
                .unwrap_or_else(|e| panic!("fixture join: {e}"));
            rx
        })
        .collect();

    (hub, inboxes)
}

/// Discard everything queued in the inboxes.
pub fn drain(inboxes: &mut [Inbox]) -> usize {
    let mut count = 0;
    for inbox in inboxes {
        while inbox.try_recv().is_ok() {
            count += 1;
        }
    }
    count
}
