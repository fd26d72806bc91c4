//! Manages the WebSocket session with the upstream realtime voice service.
//!
//! Owns the wire format on the upstream side: the session URL, the
//! `session.update` configuration payload, the audio append event, and the
//! typed server events the relay recognizes. Everything the service emits
//! beyond that closed set is captured as [`UpstreamEvent::Unknown`].

use crate::{auth::Credential, config::Config};
use anyhow::{Context, Result};
use base64::Engine;
use futures_util::{
    Sink, SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info};

const API_VERSION: &str = "2025-10-01";

pub const SAMPLE_RATE: u32 = 24000;
pub const CHANNELS: u8 = 1;
pub const AUDIO_FORMAT: &str = "pcm16";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Immutable configuration for one upstream session, built from process
/// configuration at session-open time.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            instructions: config.system_prompt.clone(),
        }
    }

    /// Builds the realtime WebSocket URL from the configured endpoint.
    fn url(&self) -> String {
        let host = self
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("wss://")
            .trim_end_matches('/');
        format!(
            "wss://{host}/voice-live/realtime?api-version={API_VERSION}&model={model}",
            model = self.model
        )
    }

    fn session_payload(&self) -> SessionPayload {
        SessionPayload {
            modalities: &["audio", "text"],
            instructions: self.instructions.clone(),
            voice: self.voice.clone(),
            input_audio_format: AUDIO_FORMAT,
            output_audio_format: AUDIO_FORMAT,
            input_audio_sample_rate: SAMPLE_RATE,
            input_audio_channels: CHANNELS,
            input_audio_transcription: TranscriptionConfig {
                model: TRANSCRIPTION_MODEL,
            },
            turn_detection: TurnDetection { r#type: "server_vad" },
        }
    }
}

// --- Client-to-upstream wire types ---

#[derive(Serialize, Debug)]
#[serde(tag = "type")]
enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionPayload },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

#[derive(Serialize, Debug)]
struct SessionPayload {
    modalities: &'static [&'static str],
    instructions: String,
    voice: String,
    input_audio_format: &'static str,
    output_audio_format: &'static str,
    input_audio_sample_rate: u32,
    input_audio_channels: u8,
    input_audio_transcription: TranscriptionConfig,
    turn_detection: TurnDetection,
}

#[derive(Serialize, Debug)]
struct TranscriptionConfig {
    model: &'static str,
}

#[derive(Serialize, Debug)]
struct TurnDetection {
    r#type: &'static str,
}

// --- Upstream-to-client wire types ---

/// One event from the upstream session's event stream.
///
/// The upstream vocabulary is larger and versioned; only the kinds the
/// relay translates are modeled, the rest land in `Unknown` with their
/// raw payload.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "response.created")]
    ResponseCreated,
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorDetail,
    },
    #[serde(skip)]
    Unknown(serde_json::Value),
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl UpstreamEvent {
    /// Parses one text frame from the upstream stream. Frames that do not
    /// match a recognized event kind become `Unknown` with the raw payload.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(event) => event,
            Err(_) => {
                let raw = serde_json::from_str::<serde_json::Value>(text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
                UpstreamEvent::Unknown(raw)
            }
        }
    }
}

/// A live session with the upstream voice service.
///
/// Created with an immutable [`SessionConfig`], then split into a writer
/// half for the ingress loop and a reader half for the egress loop.
pub struct UpstreamSession {
    inner: Transport,
}

impl UpstreamSession {
    /// Connects to the upstream service and sends the session configuration.
    pub async fn connect(config: &SessionConfig, credential: &Credential) -> Result<Self> {
        let mut request = config.url().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", credential.token()).parse()?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .context("failed to connect to upstream realtime endpoint")?;
        let mut session = Self { inner: ws_stream };

        session
            .send_event(&ClientEvent::SessionUpdate {
                session: config.session_payload(),
            })
            .await
            .context("failed to send session configuration")?;
        info!(model = %config.model, voice = %config.voice, "upstream session opened");
        Ok(session)
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.inner.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    pub fn split(self) -> (UpstreamWriter, UpstreamReader) {
        let (sink, stream) = self.inner.split();
        (UpstreamWriter { sink }, UpstreamReader { stream })
    }
}

/// Write half of an upstream session.
pub struct UpstreamWriter<S = SplitSink<Transport, WsMessage>> {
    sink: S,
}

impl<S> UpstreamWriter<S>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    #[cfg(test)]
    pub(crate) fn from_sink(sink: S) -> Self {
        Self { sink }
    }

    /// Forwards one chunk of PCM16 input audio to the upstream buffer.
    pub async fn append_audio(&mut self, chunk: &[u8]) -> Result<()> {
        let audio = base64::engine::general_purpose::STANDARD.encode(chunk);
        let text = serde_json::to_string(&ClientEvent::InputAudioBufferAppend { audio })?;
        self.sink
            .send(WsMessage::Text(text.into()))
            .await
            .context("failed to forward audio upstream")?;
        Ok(())
    }

    /// Closes the upstream session. Safe to call after the peer is gone.
    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "upstream close failed, session likely already gone");
        }
    }
}

/// Read half of an upstream session, yielding parsed events.
pub struct UpstreamReader<R = SplitStream<Transport>> {
    stream: R,
}

impl<R> UpstreamReader<R>
where
    R: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    #[cfg(test)]
    pub(crate) fn from_stream(stream: R) -> Self {
        Self { stream }
    }

    /// Returns the next event, or `None` when the upstream stream has ended.
    pub async fn next_event(&mut self) -> Result<Option<UpstreamEvent>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => return Ok(Some(UpstreamEvent::parse(&text))),
                Ok(WsMessage::Close(_)) => return Ok(None),
                // Control frames; binary frames are not part of the typed protocol.
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e).context("upstream event stream failed"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> SessionConfig {
        SessionConfig {
            endpoint: "https://example.cognitiveservices.azure.com/".to_string(),
            model: "gpt-4o".to_string(),
            voice: "en-US-AvaNeural".to_string(),
            instructions: "Be brief.".to_string(),
        }
    }

    #[test]
    fn test_url_strips_scheme_and_trailing_slash() {
        assert_eq!(
            test_config().url(),
            "wss://example.cognitiveservices.azure.com/voice-live/realtime?api-version=2025-10-01&model=gpt-4o"
        );

        let mut config = test_config();
        config.endpoint = "wss://host.example".to_string();
        assert_eq!(
            config.url(),
            "wss://host.example/voice-live/realtime?api-version=2025-10-01&model=gpt-4o"
        );
    }

    #[test]
    fn test_session_update_wire_shape() {
        let event = ClientEvent::SessionUpdate {
            session: test_config().session_payload(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "session.update",
                "session": {
                    "modalities": ["audio", "text"],
                    "instructions": "Be brief.",
                    "voice": "en-US-AvaNeural",
                    "input_audio_format": "pcm16",
                    "output_audio_format": "pcm16",
                    "input_audio_sample_rate": 24000,
                    "input_audio_channels": 1,
                    "input_audio_transcription": { "model": "whisper-1" },
                    "turn_detection": { "type": "server_vad" }
                }
            })
        );
    }

    #[test]
    fn test_audio_append_wire_shape() {
        let event = ClientEvent::InputAudioBufferAppend {
            audio: base64::engine::general_purpose::STANDARD.encode([0u8, 0x40]),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "input_audio_buffer.append", "audio": "AEA=" })
        );
    }

    #[test]
    fn test_parse_recognized_events() {
        assert!(matches!(
            UpstreamEvent::parse(r#"{"type":"session.created","session":{"id":"s1"}}"#),
            UpstreamEvent::SessionCreated
        ));
        assert!(matches!(
            UpstreamEvent::parse(r#"{"type":"response.created","response":{}}"#),
            UpstreamEvent::ResponseCreated
        ));
        assert!(matches!(
            UpstreamEvent::parse(r#"{"type":"response.done"}"#),
            UpstreamEvent::ResponseDone
        ));
        assert!(matches!(
            UpstreamEvent::parse(r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120}"#),
            UpstreamEvent::SpeechStarted
        ));

        match UpstreamEvent::parse(r#"{"type":"response.audio.delta","delta":"AEA="}"#) {
            UpstreamEvent::AudioDelta { delta } => assert_eq!(delta, "AEA="),
            other => panic!("unexpected event: {:?}", other),
        }
        match UpstreamEvent::parse(r#"{"type":"response.audio_transcript.delta","delta":"hel"}"#) {
            UpstreamEvent::AudioTranscriptDelta { delta } => assert_eq!(delta, "hel"),
            other => panic!("unexpected event: {:?}", other),
        }
        match UpstreamEvent::parse(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello there"}"#,
        ) {
            UpstreamEvent::InputTranscriptDone { transcript } => {
                assert_eq!(transcript, "hello there")
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_event() {
        match UpstreamEvent::parse(
            r#"{"type":"error","error":{"message":"rate limited","code":"429"}}"#,
        ) {
            UpstreamEvent::Error { error } => {
                assert_eq!(error.message.as_deref(), Some("rate limited"));
                assert_eq!(error.code.as_deref(), Some("429"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_event_without_payload() {
        match UpstreamEvent::parse(r#"{"type":"error"}"#) {
            UpstreamEvent::Error { error } => assert_eq!(error, ErrorDetail::default()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_after_peer_gone() {
        use futures::channel::mpsc;

        let (tx, rx) = mpsc::channel::<WsMessage>(4);
        let mut writer = UpstreamWriter::from_sink(tx);
        drop(rx);

        // Neither call may panic or propagate an error.
        writer.close().await;
        writer.close().await;
    }

    #[test]
    fn test_parse_unknown_event_keeps_raw() {
        match UpstreamEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#) {
            UpstreamEvent::Unknown(raw) => {
                assert_eq!(raw["type"], "rate_limits.updated");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Non-JSON frames also land in Unknown rather than failing.
        assert!(matches!(
            UpstreamEvent::parse("not json"),
            UpstreamEvent::Unknown(_)
        ));
    }

    #[test]
    fn test_missing_delta_defaults_to_empty() {
        match UpstreamEvent::parse(r#"{"type":"response.audio_transcript.delta"}"#) {
            UpstreamEvent::AudioTranscriptDelta { delta } => assert!(delta.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
