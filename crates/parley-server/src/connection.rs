//! WebSocket connection handling for Parley server.
//!
//! Each socket gets a [`Session`] holding the connection-scoped state the
//! channel engine does not track: which identity is speaking, which channel
//! it is currently in, and which encoding the client uses.

use crate::handlers::AppState;
use crate::lobby::LoginError;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::{ChannelEvent, RegistryError};
use parley_protocol::{codec, codes, Frame, PROTOCOL_VERSION};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Encoding used on a socket.
///
/// Chosen with the `wire` query parameter on upgrade; after that each
/// inbound message switches the socket to its own encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wire {
    /// JSON in text messages.
    #[default]
    Text,
    /// Length-prefixed MessagePack in binary messages.
    Binary,
}

/// Connection-scoped state.
#[derive(Debug)]
pub struct Session {
    identity: String,
    current_channel: Option<String>,
    wire: Wire,
}

impl Session {
    /// Create a session for `identity` speaking `wire`, not yet in any channel.
    #[must_use]
    pub fn new(identity: impl Into<String>, wire: Wire) -> Self {
        Self {
            identity: identity.into(),
            current_channel: None,
            wire,
        }
    }

    /// The identity bound to this connection.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The channel this connection is in, if any.
    #[must_use]
    pub fn current_channel(&self) -> Option<&str> {
        self.current_channel.as_deref()
    }

    /// Encoding for outbound frames.
    #[must_use]
    pub fn wire(&self) -> Wire {
        self.wire
    }

    /// Apply one client frame. Returns the direct reply, if any.
    ///
    /// Channel events produced by the frame reach this client through its
    /// sink like everyone else's, not through the reply.
    pub fn handle_frame(&mut self, frame: Frame, state: &AppState) -> Option<Frame> {
        match frame {
            Frame::Join { channel } => self.join(&channel, state),
            Frame::Leave => self.leave(state),
            Frame::Send { body, timestamp } => self.send(&body, &timestamp, state),
            Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),
            other => {
                warn!(identity = %self.identity, frame_type = ?other.frame_type(), "Unexpected frame type");
                Some(Frame::error(
                    codes::UNEXPECTED_FRAME,
                    format!("Unexpected frame type {:?}", other.frame_type()),
                ))
            }
        }
    }

    fn join(&mut self, channel: &str, state: &AppState) -> Option<Frame> {
        if !state.hub.registry().channel_exists(channel) {
            return Some(registry_error_frame(&RegistryError::ChannelNotFound(
                channel.to_string(),
            )));
        }

        if let Some(previous) = self.current_channel.take() {
            if previous != channel {
                self.leave_channel(&previous, state);
            }
        }

        match state.hub.on_join(channel, &self.identity) {
            Ok(fanout) => {
                metrics::record_fanout("join", &fanout);
                self.current_channel = Some(channel.to_string());
                None
            }
            Err(e) => Some(registry_error_frame(&e)),
        }
    }

    fn leave(&mut self, state: &AppState) -> Option<Frame> {
        match self.current_channel.take() {
            Some(channel) => {
                self.leave_channel(&channel, state);
                None
            }
            None => Some(Frame::error(codes::NOT_IN_CHANNEL, "Not in a channel")),
        }
    }

    fn leave_channel(&self, channel: &str, state: &AppState) {
        match state.hub.on_leave(channel, &self.identity) {
            Ok(fanout) => metrics::record_fanout("leave", &fanout),
            Err(e) => debug!(identity = %self.identity, error = %e, "Leave skipped"),
        }
    }

    fn send(&mut self, body: &str, timestamp: &str, state: &AppState) -> Option<Frame> {
        let max = state.config.limits.max_message_size;
        if body.len() > max {
            return Some(Frame::error(
                codes::MESSAGE_TOO_LARGE,
                format!("Message exceeds {max} bytes"),
            ));
        }

        let Some(channel) = self.current_channel.as_deref() else {
            return Some(Frame::error(codes::NOT_IN_CHANNEL, "Join a channel first"));
        };

        match state.hub.on_message(channel, &self.identity, body, timestamp) {
            Ok(fanout) => {
                metrics::record_fanout("message", &fanout);
                None
            }
            Err(e) => Some(registry_error_frame(&e)),
        }
    }
}

/// Map a registry failure to an error frame.
fn registry_error_frame(e: &RegistryError) -> Frame {
    let code = match e {
        RegistryError::ChannelNotFound(_) => codes::CHANNEL_NOT_FOUND,
        _ => codes::BAD_FRAME,
    };
    Frame::error(code, e.to_string())
}

/// Convert a channel event into its outbound frame.
#[must_use]
pub fn event_frame(event: &ChannelEvent) -> Frame {
    match event {
        ChannelEvent::Status {
            identity,
            channel,
            note,
        } => Frame::Status {
            identity: identity.clone(),
            channel: channel.clone(),
            note: note.clone(),
        },
        ChannelEvent::Announce {
            identity,
            timestamp,
            body,
        } => Frame::Announce {
            identity: identity.clone(),
            timestamp: timestamp.clone(),
            body: body.clone(),
        },
    }
}

/// Serve one WebSocket for `identity` until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: String, wire: Wire) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = state.lobby.connect(&identity) {
        warn!(identity = %identity, error = %e, "Rejecting connection");
        let code = match e {
            LoginError::NotLoggedIn(_) => codes::NOT_LOGGED_IN,
            _ => codes::ALREADY_CONNECTED,
        };
        reject(&mut sender, wire, Frame::error(code, e.to_string())).await;
        return;
    }

    let (events_tx, mut events) =
        mpsc::channel::<Arc<ChannelEvent>>(state.config.delivery.queue_capacity.max(1));
    if !state.hub.try_attach(identity.as_str(), Arc::new(events_tx)) {
        warn!(identity = %identity, "Sink already attached");
        state.lobby.release(&identity);
        let frame = Frame::error(codes::ALREADY_CONNECTED, "Identity already connected");
        reject(&mut sender, wire, frame).await;
        return;
    }

    debug!(identity = %identity, ?wire, "WebSocket connected");
    let mut session = Session::new(identity, wire);

    let welcome = Frame::welcome(session.identity(), PROTOCOL_VERSION.major);
    if send_frame(&mut sender, session.wire(), &welcome).await.is_err() {
        warn!(identity = %session.identity(), "Failed to send Welcome frame");
    } else {
        serve(&mut session, &state, &mut sender, &mut receiver, &mut events).await;
    }

    // The connection is gone: leave the current channel and drop the sink
    match state
        .hub
        .disconnect(session.identity(), session.current_channel())
    {
        Ok(Some(fanout)) => metrics::record_fanout("leave", &fanout),
        Ok(None) => {}
        Err(e) => debug!(identity = %session.identity(), error = %e, "Disconnect leave skipped"),
    }
    state.lobby.release(session.identity());

    debug!(identity = %session.identity(), "WebSocket disconnected");
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, wire: Wire, frame: Frame) {
    let _ = send_frame(sender, wire, &frame).await;
    let _ = sender.close().await;
}

async fn serve(
    session: &mut Session,
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    events: &mut mpsc::Receiver<Arc<ChannelEvent>>,
) {
    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => {
                if send_frame(sender, session.wire(), &event_frame(&event)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                let start = Instant::now();
                let frames = match msg {
                    Some(Ok(Message::Binary(data))) => {
                        session.wire = Wire::Binary;
                        metrics::record_frame(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);
                        decode_buffered(&mut read_buffer)
                    }
                    Some(Ok(Message::Text(text))) => {
                        session.wire = Wire::Text;
                        metrics::record_frame(text.len(), "inbound");
                        vec![codec::decode_text(&text).map_err(|e| e.to_string())]
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) => {
                        debug!(identity = %session.identity(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(identity = %session.identity(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(identity = %session.identity(), "WebSocket stream ended");
                        break;
                    }
                };

                for decoded in frames {
                    let reply = match decoded {
                        Ok(frame) => session.handle_frame(frame, state),
                        Err(e) => {
                            warn!(identity = %session.identity(), error = %e, "Bad frame");
                            metrics::record_error("decode");
                            Some(Frame::error(codes::BAD_FRAME, e))
                        }
                    };
                    if let Some(reply) = reply {
                        if send_frame(sender, session.wire(), &reply).await.is_err() {
                            return;
                        }
                    }
                }

                metrics::record_latency(start.elapsed().as_secs_f64());
            }
        }
    }
}

/// Decode every complete binary frame in the buffer.
///
/// A decode error discards the buffer, since the stream position is lost.
fn decode_buffered(buf: &mut BytesMut) -> Vec<Result<Frame, String>> {
    let mut frames = Vec::new();
    loop {
        match codec::decode_from(buf) {
            Ok(Some(frame)) => frames.push(Ok(frame)),
            Ok(None) => break,
            Err(e) => {
                buf.clear();
                frames.push(Err(e.to_string()));
                break;
            }
        }
    }
    frames
}

/// Send a frame to the WebSocket.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    wire: Wire,
    frame: &Frame,
) -> Result<()> {
    let message = match wire {
        Wire::Text => Message::Text(codec::encode_text(frame)?),
        Wire::Binary => Message::Binary(codec::encode(frame)?.to_vec()),
    };
    let len = match &message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        _ => 0,
    };
    metrics::record_frame(len, "outbound");
    sender.send(message).await?;
    Ok(())
}
