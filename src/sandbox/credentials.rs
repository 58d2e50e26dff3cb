//! API credentials for sandbox provisioning.
//!
//! The session asks for a key every time it provisions (construction and
//! each restart). Where keys come from is the caller's business; nothing
//! here embeds a secret.

use rand::seq::SliceRandom;

use crate::error::{ExecutorError, Result};

pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> Result<String>;
}

/// Always hands out the same key.
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl CredentialSource for StaticCredential {
    fn api_key(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Picks a key at random from a pool on each provisioning, spreading
/// sandbox quota across several provider accounts.
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Blank entries (e.g. an unset `${VAR}`) are dropped.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialSource for KeyPool {
    fn api_key(&self) -> Result<String> {
        self.keys
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ExecutorError::SandboxProvision("no API key configured".into()))
    }
}
