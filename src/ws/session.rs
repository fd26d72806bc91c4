//! Per-connection supervision of the relay between one browser and one
//! upstream session.
//!
//! Each accepted WebSocket gets its own supervisor: it acquires a
//! credential, opens the upstream session, then races the two forwarding
//! loops. The first loop to finish cancels the other, and teardown closes
//! both endpoints no matter which side ended the conversation.

use super::{
    codec,
    normalize::normalize,
    protocol::{ClientMessage, ServerMessage},
    upstream::{SessionConfig, UpstreamReader, UpstreamSession, UpstreamWriter},
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::{fmt::Display, sync::Arc};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, protocol::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Supervises one relay session from open to teardown.
///
/// Failures here are scoped to this connection; the acceptor keeps serving
/// other clients regardless of how this session ends.
#[instrument(name = "voice_session", skip_all, fields(conn_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id: u32 = rand::random();
    tracing::Span::current().record("conn_id", &conn_id.to_string());
    info!("Browser connected. Opening upstream session...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));

    let credential = match state.credentials.acquire().await {
        Ok(credential) => credential,
        Err(e) => {
            error!(error = ?e, "Credential acquisition failed");
            close_client(&socket_tx, Some(format!("{e:#}"))).await;
            return;
        }
    };

    let session_config = SessionConfig::from_config(&state.config);
    let session = match UpstreamSession::connect(&session_config, &credential).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = ?e, "Failed to open upstream session");
            close_client(&socket_tx, Some(format!("{e:#}"))).await;
            return;
        }
    };
    let (mut upstream_tx, mut upstream_rx) = session.split();

    // Race the two forwarding loops; dropping the loser at the first
    // completion cancels it at its next suspension point.
    let result = tokio::select! {
        r = ingress(&mut socket_rx, &mut upstream_tx) => r.context("client-to-upstream loop failed"),
        r = egress(&mut upstream_rx, &socket_tx) => r.context("upstream-to-client loop failed"),
    };

    let error_message = match &result {
        Ok(()) => None,
        Err(e) => {
            error!(error = ?e, "Session loop terminated with error");
            Some(format!("{e:#}"))
        }
    };

    upstream_tx.close().await;
    drop(credential);
    close_client(&socket_tx, error_message).await;
    info!("Session closed");
}

/// Best-effort error report followed by a close of the client connection.
async fn close_client<S>(socket_tx: &Arc<Mutex<S>>, error_message: Option<String>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut sink = socket_tx.lock().await;
    if let Some(message) = error_message {
        codec::send_event(&mut *sink, &ServerMessage::Error { message }).await;
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "client connection already closed");
    }
}

/// Client-to-upstream loop: forwards audio chunks in arrival order until
/// the client disconnects or sends the end directive.
async fn ingress<C, U>(socket_rx: &mut C, upstream: &mut UpstreamWriter<U>) -> Result<()>
where
    C: Stream<Item = Result<Message, axum::Error>> + Unpin,
    U: Sink<WsMessage> + Unpin,
    U::Error: std::error::Error + Send + Sync + 'static,
{
    while let Some(msg) = socket_rx.next().await {
        match msg {
            Ok(Message::Binary(data)) => upstream.append_audio(&data).await?,
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::End) => {
                    info!("Client requested session end");
                    return Ok(());
                }
                // Anything else from the client is noise, not an error.
                Err(_) => debug!("Discarding unrecognized client text frame"),
            },
            Ok(Message::Close(_)) => {
                info!("Client closed the connection");
                return Ok(());
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                info!(error = %e, "Client connection lost");
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Upstream-to-client loop: normalizes each event and emits the result.
/// A failure translating one event is reported and the loop moves on; only
/// the end of the upstream stream or a transport failure stops it.
async fn egress<R, S>(upstream: &mut UpstreamReader<R>, socket_tx: &Arc<Mutex<S>>) -> Result<()>
where
    R: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(event) = upstream.next_event().await? {
        match normalize(event) {
            Ok(Some(outbound)) => {
                codec::send_outbound(&mut *socket_tx.lock().await, outbound).await
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = ?e, "Failed to translate upstream event");
                codec::send_event(
                    &mut *socket_tx.lock().await,
                    &ServerMessage::Error {
                        message: format!("{e:#}"),
                    },
                )
                .await;
            }
        }
    }
    info!("Upstream event stream ended");
    Ok(())
}
