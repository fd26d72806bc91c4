//! Credential acquisition for the upstream voice service.
//!
//! The relay treats authentication as an opaque capability: a provider
//! hands out a [`Credential`] when a session opens, and the credential is
//! released when it goes out of scope, whichever way the session ends.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// A bearer token scoped to one upstream session.
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    // Never print the token itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        debug!("credential released");
    }
}

/// Source of upstream credentials, one acquisition per session.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn acquire(&self) -> Result<Credential>;
}

/// Provider backed by a fixed API key from the environment.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn acquire(&self) -> Result<Credential> {
        Ok(Credential::new(self.token.clone()))
    }
}
