//! Translates upstream events into the client-facing protocol.
//!
//! This is the single boundary between the upstream service's event
//! vocabulary and the small, stable schema the browser speaks. Each event
//! maps to zero or one outbound unit; audio deltas are decoded once and
//! forwarded as raw binary frames.

use super::{
    protocol::{Outbound, Role, ServerMessage, Status},
    upstream::UpstreamEvent,
};
use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;
use tracing::{debug, warn};

/// Maps one upstream event to at most one client-bound message.
pub fn normalize(event: UpstreamEvent) -> Result<Option<Outbound>> {
    let outbound = match event {
        UpstreamEvent::SessionCreated
        | UpstreamEvent::SpeechStarted
        | UpstreamEvent::ResponseDone => Some(status(Status::Listening)),
        UpstreamEvent::ResponseCreated => Some(status(Status::Thinking)),
        UpstreamEvent::AudioDelta { delta } => {
            let pcm = base64::engine::general_purpose::STANDARD
                .decode(delta)
                .context("invalid base64 in upstream audio delta")?;
            // An empty delta carries no audio for the browser to play.
            if pcm.is_empty() {
                None
            } else {
                Some(Outbound::Audio(Bytes::from(pcm)))
            }
        }
        UpstreamEvent::AudioTranscriptDelta { delta } => transcript(Role::Assistant, delta, false),
        UpstreamEvent::AudioTranscriptDone { transcript: text } => {
            transcript(Role::Assistant, text, true)
        }
        UpstreamEvent::InputTranscriptDelta { delta } => transcript(Role::User, delta, false),
        UpstreamEvent::InputTranscriptDone { transcript: text } => {
            transcript(Role::User, text, true)
        }
        UpstreamEvent::Error { error } => {
            let message = error
                .message
                .clone()
                .unwrap_or_else(|| format!("{error:?}"));
            warn!(message = %message, "upstream reported an error");
            Some(Outbound::Event(ServerMessage::Error { message }))
        }
        UpstreamEvent::Unknown(raw) => {
            debug!(event = %raw, "ignoring unhandled upstream event");
            None
        }
    };
    Ok(outbound)
}

fn status(status: Status) -> Outbound {
    Outbound::Event(ServerMessage::Status { status })
}

// Empty transcript fragments carry no information for the client.
fn transcript(role: Role, text: String, is_final: bool) -> Option<Outbound> {
    if text.is_empty() {
        None
    } else {
        Some(Outbound::Event(ServerMessage::Transcript {
            role,
            text,
            is_final,
        }))
    }
}
