/// Artifact publisher: one write of sealed bytes to the configured location.
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{LogsealError, Result};
use crate::storage::{ObjectStore, StorageKey, StorageLocation};

/// Why a publish did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    /// Backend unreachable, timed out, or the connection broke.
    Transport,
    /// Credentials rejected.
    Auth,
    /// Backend answered with a non-success status.
    BackendRejected,
    /// Key was empty or escaped the configured namespace; nothing was sent.
    InvalidKey,
}

/// Outcome of a single `publish` call.
#[derive(Debug)]
pub struct PublishOutcome {
    pub ok: bool,
    pub key: String,
    pub size: u64,
    /// Hex BLAKE3 of the stored bytes (present iff `ok`).
    pub content_hash: Option<String>,
    pub diagnostic: Option<String>,
    /// Failure category (present iff `!ok`).
    pub failure: Option<PublishFailure>,
}

impl PublishOutcome {
    fn failed(key: &StorageKey, size: u64, failure: PublishFailure, diagnostic: String) -> Self {
        Self {
            ok: false,
            key: key.to_string(),
            size,
            content_hash: None,
            diagnostic: Some(diagnostic),
            failure: Some(failure),
        }
    }
}

pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    location: StorageLocation,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, location: StorageLocation) -> Self {
        Self { store, location }
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Startup validation of the location against the backend.
    pub async fn check(&self) -> Result<()> {
        self.store.check(&self.location).await
    }

    /// Write `data` under `key`. Exactly one attempt; no retry, no local copy.
    pub async fn publish(&self, key: &StorageKey, data: Vec<u8>) -> PublishOutcome {
        let size = data.len() as u64;

        if !key.is_within(&self.location) {
            error!(key = %key, location = %self.location, "Refusing to publish outside the namespace");
            return PublishOutcome::failed(
                key,
                size,
                PublishFailure::InvalidKey,
                format!("Key {key} is outside {}", self.location),
            );
        }

        match self.store.put(&self.location, key, data).await {
            Ok(result) => {
                info!(
                    backend = self.store.name(),
                    bucket = %self.location.bucket,
                    key = %result.storage_key,
                    bytes = result.size,
                    "Object stored"
                );
                PublishOutcome {
                    ok: true,
                    key: result.storage_key,
                    size: result.size,
                    content_hash: Some(hex::encode(result.content_hash)),
                    diagnostic: None,
                    failure: None,
                }
            }
            Err(e) => {
                let failure = match &e {
                    LogsealError::Auth(_) => PublishFailure::Auth,
                    LogsealError::BackendRejected(_) => PublishFailure::BackendRejected,
                    _ => PublishFailure::Transport,
                };
                error!(
                    backend = self.store.name(),
                    key = %key,
                    error = %e,
                    "Publish failed"
                );
                PublishOutcome::failed(key, size, failure, e.to_string())
            }
        }
    }
}
