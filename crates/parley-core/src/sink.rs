//! Per-participant delivery sinks.
//!
//! A sink is how the hub hands an event to one participant's connection. Sinks
//! must not block: the hub calls them one after another during fan-out.

use crate::message::ChannelEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Delivery errors, reported per recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side of the sink is gone.
    #[error("Recipient disconnected")]
    Closed,

    /// The recipient's queue is full.
    #[error("Recipient queue full")]
    Full,

    /// No sink is attached for the recipient.
    #[error("No sink attached for recipient")]
    NoSink,
}

/// Something that can accept events for one participant.
pub trait EventSink: Send + Sync {
    /// Hand an event to the participant without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be queued.
    fn deliver(&self, event: Arc<ChannelEvent>) -> Result<(), DeliveryError>;
}

impl EventSink for mpsc::Sender<Arc<ChannelEvent>> {
    fn deliver(&self, event: Arc<ChannelEvent>) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl EventSink for mpsc::UnboundedSender<Arc<ChannelEvent>> {
    fn deliver(&self, event: Arc<ChannelEvent>) -> Result<(), DeliveryError> {
        self.send(event).map_err(|_| DeliveryError::Closed)
    }
}
