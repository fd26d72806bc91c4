//! Defines the WebSocket message protocol between the browser client and the relay.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the relay.
///
/// Binary frames carry raw PCM16 audio and never reach this type; the only
/// recognized text frame is the end-of-session directive.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Ends the voice session. The client may also simply close the socket.
    #[serde(rename = "end")]
    End,
}

/// What the relay is currently doing with the conversation turn.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Listening,
    Thinking,
}

/// Who produced a piece of transcribed speech.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Structured messages sent from the relay to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Turn-taking state for driving the client UI.
    Status { status: Status },
    /// Incremental or finalized speech-to-text for either speaker.
    Transcript {
        role: Role,
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    /// Reports an error to the client.
    Error { message: String },
}

/// One unit bound for the client: either a structured JSON message or a
/// raw PCM16 audio frame sent as a binary WebSocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerMessage),
    Audio(Bytes),
}
