//! Frame types for the Parley protocol.
//!
//! Frames are the unit of communication on a Parley WebSocket. Clients send
//! `join`, `leave`, `send` and `ping`; the server answers with `welcome`,
//! `status`, `announce`, `error` and `pong`.

use serde::{Deserialize, Serialize};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Join = 0x01,
    Leave = 0x02,
    Send = 0x03,
    Ping = 0x04,
    Welcome = 0x10,
    Status = 0x11,
    Announce = 0x12,
    Error = 0x13,
    Pong = 0x14,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Join),
            0x02 => Ok(FrameType::Leave),
            0x03 => Ok(FrameType::Send),
            0x04 => Ok(FrameType::Ping),
            0x10 => Ok(FrameType::Welcome),
            0x11 => Ok(FrameType::Status),
            0x12 => Ok(FrameType::Announce),
            0x13 => Ok(FrameType::Error),
            0x14 => Ok(FrameType::Pong),
            _ => Err("Invalid frame type"),
        }
    }
}

impl FrameType {
    /// Whether frames of this type are sent by clients.
    #[must_use]
    pub fn is_client(self) -> bool {
        (self as u8) < 0x10
    }
}

/// Error codes carried in [`Frame::Error`].
pub mod codes {
    /// The frame could not be decoded.
    pub const BAD_FRAME: u16 = 1001;
    /// The named channel does not exist.
    pub const CHANNEL_NOT_FOUND: u16 = 1002;
    /// A message was sent without joining a channel first.
    pub const NOT_IN_CHANNEL: u16 = 1003;
    /// The message body exceeds the configured size.
    pub const MESSAGE_TOO_LARGE: u16 = 1004;
    /// The frame is only valid in the other direction.
    pub const UNEXPECTED_FRAME: u16 = 1005;
    /// The identity already has an open connection.
    pub const ALREADY_CONNECTED: u16 = 1006;
    /// The identity logged out before the socket opened.
    pub const NOT_LOGGED_IN: u16 = 1007;
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Enter a channel, leaving the current one if any.
    #[serde(rename = "join")]
    Join {
        /// Channel name.
        channel: String,
    },

    /// Leave the current channel.
    #[serde(rename = "leave")]
    Leave,

    /// Send a message to the current channel.
    #[serde(rename = "send")]
    Send {
        /// Message text.
        body: String,
        /// Client-side timestamp, displayed verbatim.
        timestamp: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent once the socket is accepted.
    #[serde(rename = "welcome")]
    Welcome {
        /// The identity bound to this connection.
        identity: String,
        /// Protocol major version.
        version: u8,
    },

    /// Someone joined or left the channel.
    #[serde(rename = "status")]
    Status {
        /// The identity that joined or left.
        identity: String,
        /// Channel name.
        channel: String,
        /// Human-readable note.
        note: String,
    },

    /// A chat message in the channel.
    #[serde(rename = "announce")]
    Announce {
        /// Sender identity.
        identity: String,
        /// Sender's timestamp.
        timestamp: String,
        /// Message text.
        body: String,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Error code, see [`codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Join { .. } => FrameType::Join,
            Frame::Leave => FrameType::Leave,
            Frame::Send { .. } => FrameType::Send,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Welcome { .. } => FrameType::Welcome,
            Frame::Status { .. } => FrameType::Status,
            Frame::Announce { .. } => FrameType::Announce,
            Frame::Error { .. } => FrameType::Error,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a new Join frame.
    #[must_use]
    pub fn join(channel: impl Into<String>) -> Self {
        Frame::Join {
            channel: channel.into(),
        }
    }

    /// Create a new Send frame.
    #[must_use]
    pub fn send(body: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Frame::Send {
            body: body.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Create a new Welcome frame.
    #[must_use]
    pub fn welcome(identity: impl Into<String>, version: u8) -> Self {
        Frame::Welcome {
            identity: identity.into(),
            version,
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        assert_eq!(Frame::join("general").frame_type(), FrameType::Join);
        assert_eq!(Frame::Leave.frame_type(), FrameType::Leave);
        assert_eq!(Frame::send("hi", "12:00").frame_type(), FrameType::Send);
        assert!(FrameType::Send.is_client());
        assert!(!FrameType::Announce.is_client());
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(0x01), Ok(FrameType::Join));
        assert_eq!(FrameType::try_from(0x12), Ok(FrameType::Announce));
        assert!(FrameType::try_from(0x7F).is_err());
        assert_eq!(u8::from(FrameType::Pong), 0x14);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Frame::join("general")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "join", "channel": "general"}));

        let leave: Frame = serde_json::from_str(r#"{"type":"leave"}"#).unwrap();
        assert_eq!(leave, Frame::Leave);

        let ping: Frame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, Frame::ping());
    }
}
