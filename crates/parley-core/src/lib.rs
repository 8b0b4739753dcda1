//! # parley-core
//!
//! In-memory channel engine for the Parley chat server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ChannelRegistry** - Creates and looks up channels, in creation order
//! - **MessageHistory** - Bounded per-channel ring of recent messages
//! - **Membership** - Per-channel set of connected identities
//! - **BroadcastHub** - Applies join/leave/message events and fans them out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────────┐
//! │  Connection │────▶│ BroadcastHub │────▶│ ChannelRegistry │
//! └─────────────┘     └──────────────┘     └─────────────────┘
//!        ▲                   │                      │
//!        │                   ▼                      ▼
//!        │            ┌─────────────┐     ┌───────────────────┐
//!        └────────────│  EventSink  │     │ Channel           │
//!                     └─────────────┘     │  MessageHistory   │
//!                                         │  Membership       │
//!                                         └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{BroadcastHub, ChannelEvent};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let hub = BroadcastHub::new();
//! hub.create_channel("general").unwrap();
//!
//! let (tx, mut rx) = mpsc::unbounded_channel::<Arc<ChannelEvent>>();
//! hub.attach("alice", Arc::new(tx));
//!
//! hub.on_join("general", "alice").unwrap();
//! hub.on_message("general", "alice", "hello", "12:00").unwrap();
//!
//! assert_eq!(rx.try_recv().unwrap().identity(), "alice");
//! assert_eq!(hub.enter_channel("general").unwrap().history.len(), 1);
//! ```

pub mod channel;
pub mod history;
pub mod hub;
pub mod membership;
pub mod message;
pub mod registry;
pub mod sink;

pub use channel::{Channel, ChannelId, ChannelSnapshot};
pub use history::{MessageHistory, DEFAULT_HISTORY_CAPACITY};
pub use hub::{BroadcastHub, Fanout, HubConfig, HubStats};
pub use membership::{Member, Membership};
pub use message::{ChannelEvent, ChatMessage, Identity};
pub use registry::{ChannelRegistry, RegistryError, RegistryStats, SharedChannel};
pub use sink::{DeliveryError, EventSink};
