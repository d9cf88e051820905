/// Startup: turn an `AppConfig` into a ready-to-serve pipeline.
///
/// Every check here is fatal. If the recipient key cannot be resolved or the
/// bucket cannot be reached with the configured credentials, the process
/// refuses to start instead of accepting uploads it cannot fulfil.
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::EncryptionEngine;
use crate::error::Result;
use crate::keyring::{KeyStore, Keyring, RecipientKey};
use crate::pipeline::Pipeline;
use crate::publisher::ArtifactPublisher;
use crate::storage::memory::{MemoryStore, DRY_RUN_MAX_OBJECTS};
use crate::storage::s3::S3Store;
use crate::storage::{ObjectStore, StorageLocation};

/// A validated, immutable service instance.
pub struct Service {
    pub pipeline: Arc<Pipeline>,
    pub recipient: RecipientKey,
}

impl Service {
    /// Load the keyring, connect to S3, and validate both.
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let keyring = Keyring::load(&config.recipient.keyring)?;
        let store: Arc<dyn ObjectStore> = if config.publisher.dry_run {
            warn!(
                max_objects = DRY_RUN_MAX_OBJECTS,
                "Dry run: sealed logs are kept in memory and discarded on exit"
            );
            Arc::new(MemoryStore::with_max_objects(DRY_RUN_MAX_OBJECTS))
        } else {
            Arc::new(S3Store::connect(&config.publisher.s3).await?)
        };

        Self::with_parts(
            Arc::new(keyring),
            store,
            config.publisher.location.clone(),
            &config.recipient.recipient,
            config.recipient.chunked_threshold,
        )
        .await
    }

    /// Assemble and validate a service from injected collaborators.
    pub async fn with_parts(
        keystore: Arc<dyn KeyStore>,
        store: Arc<dyn ObjectStore>,
        location: StorageLocation,
        recipient: &str,
        chunked_threshold: usize,
    ) -> Result<Self> {
        info!("Valid recipients: {:?}", keystore.recipients());
        let recipient_key = keystore.resolve(recipient)?;
        recipient_key.ensure_usable()?;
        info!(
            recipient = %recipient_key.id,
            fingerprint = %recipient_key.fingerprint(),
            "Sealing logs to recipient"
        );

        let publisher = ArtifactPublisher::new(store, location);
        publisher.check().await?;
        info!("Will upload files to bucket: {}", publisher.location());

        let engine = EncryptionEngine::new(keystore, chunked_threshold);
        let pipeline = Pipeline::new(engine, publisher, recipient_key.id.clone());

        Ok(Self {
            pipeline: Arc::new(pipeline),
            recipient: recipient_key,
        })
    }
}
