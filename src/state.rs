//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the immutable
//! process-wide resources every connection shares.

use crate::{auth::CredentialProvider, config::Config};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<dyn CredentialProvider>,
}
