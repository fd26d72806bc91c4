//! VoiceLive Relay Library Crate
//!
//! This library contains all the logic for the voice relay service: the
//! environment configuration, credential provider, application state,
//! routing, and the WebSocket relay itself. The `relay` binary is a thin
//! wrapper around this library.

pub mod auth;
pub mod config;
pub mod router;
pub mod state;
pub mod ws;
