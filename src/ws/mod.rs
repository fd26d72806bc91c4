//! WebSocket Relay
//!
//! This module contains the core logic for bridging a browser audio client
//! to the upstream realtime voice service. It is structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `codec`: Serializes and sends outbound messages, tolerating a closed client.
//! - `upstream`: Manages the WebSocket session with the upstream voice service.
//! - `normalize`: Translates upstream events into the client-facing protocol.
//! - `session`: Per-connection supervisor running the two forwarding loops.

pub mod codec;
pub mod normalize;
pub mod protocol;
pub mod session;
pub mod upstream;

pub use session::ws_handler;
