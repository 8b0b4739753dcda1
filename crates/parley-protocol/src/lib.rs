//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat server.
//!
//! This crate defines the frames exchanged over a Parley WebSocket and the
//! codecs used to carry them: length-prefixed MessagePack for binary messages
//! and JSON for text messages.
//!
//! ## Frame Types
//!
//! - `Join` / `Leave` - Enter or leave a channel
//! - `Send` - Post a message to the current channel
//! - `Status` / `Announce` - Membership notices and chat messages
//! - `Welcome` / `Error` / `Ping` / `Pong` - Session housekeeping
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{Frame, codec};
//!
//! let frame = Frame::send("Hello, world!", "12:00");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//!
//! let text = codec::encode_text(&frame).unwrap();
//! assert_eq!(codec::decode_text(&text).unwrap(), frame);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{codes, Frame, FrameType};
pub use version::{Version, PROTOCOL_VERSION};
