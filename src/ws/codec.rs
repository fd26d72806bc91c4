//! Serializes and sends client-bound messages.
//!
//! Structured messages go out as JSON text frames, audio as binary frames.
//! A send against a closed connection is swallowed: the receiving loops
//! notice the closed transport on their own, so a failed send must never
//! tear down the caller.

use super::protocol::{Outbound, ServerMessage};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tracing::debug;

/// Sends one outbound unit, picking the frame type by payload.
pub async fn send_outbound<S>(sink: &mut S, outbound: Outbound)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match outbound {
        Outbound::Audio(pcm) => send_frame(sink, Message::Binary(pcm)).await,
        Outbound::Event(msg) => send_event(sink, &msg).await,
    }
}

/// Serializes a `ServerMessage` and sends it as a text frame.
pub async fn send_event<S>(sink: &mut S, msg: &ServerMessage)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match serde_json::to_string(msg) {
        Ok(text) => send_frame(sink, Message::Text(text.into())).await,
        Err(e) => debug!(error = %e, "failed to serialize server message"),
    }
}

async fn send_frame<S>(sink: &mut S, frame: Message)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    if let Err(e) = sink.send(frame).await {
        debug!(error = %e, "client send failed, connection likely closed");
    }
}
