/// Pipeline coordinator.
///
/// Drives one upload through a fixed sequence:
/// 1. Validate the request (non-empty body, usable identifier)
/// 2. Compress and seal the payload on the blocking pool
/// 3. Publish the sealed bytes to object storage
/// 4. Map the outcome to a caller-facing status and body
///
/// Encrypt failures and publish failures stay distinct all the way to the
/// caller: "could not encrypt" and "encrypted but could not store" need
/// different fixes. Nothing is retried and nothing is kept after a failure.
use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::crypto::sensitive::Plaintext;
use crate::engine::{EncryptFailure, EncryptionEngine};
use crate::publisher::{ArtifactPublisher, PublishFailure};
use crate::storage::StorageKey;

/// Query parameter that names the log source.
pub const IDENTIFIER_PARAM: &str = "minion";

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rejected,
    Received,
    Encrypting,
    Encrypted,
    EncryptFailed,
    Publishing,
    Published,
    PublishFailed,
}

/// Why a request was turned away before encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyBody,
    MissingIdentifier,
    InvalidIdentifier,
}

/// Terminal result of `Pipeline::process`.
#[derive(Debug)]
pub enum PipelineOutcome {
    Rejected {
        reason: Rejection,
        diagnostic: Option<String>,
    },
    EncryptFailed {
        failure: Option<EncryptFailure>,
        diagnostic: String,
    },
    PublishFailed {
        key: String,
        failure: Option<PublishFailure>,
        diagnostic: String,
    },
    Published {
        key: String,
        size: u64,
    },
}

/// JSON body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Error { error: &'static str },
    Message { message: &'static str },
}

impl PipelineOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineOutcome::Rejected { .. } => Stage::Rejected,
            PipelineOutcome::EncryptFailed { .. } => Stage::EncryptFailed,
            PipelineOutcome::PublishFailed { .. } => Stage::PublishFailed,
            PipelineOutcome::Published { .. } => Stage::Published,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Published { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineOutcome::Rejected { .. } => StatusCode::BAD_REQUEST,
            PipelineOutcome::EncryptFailed { .. } | PipelineOutcome::PublishFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineOutcome::Published { .. } => StatusCode::CREATED,
        }
    }

    /// Caller-facing body. Generic per category; diagnostics stay in the log.
    pub fn body(&self) -> ResponseBody {
        match self {
            PipelineOutcome::Rejected { reason, .. } => ResponseBody::Error {
                error: match reason {
                    Rejection::EmptyBody => "No post data found!",
                    Rejection::MissingIdentifier => "Missing param: minion",
                    Rejection::InvalidIdentifier => "Invalid param: minion",
                },
            },
            PipelineOutcome::PublishFailed { .. } => ResponseBody::Message {
                message: "Sorry. We couldn't encrypt that file. Please try again later.",
            },
            PipelineOutcome::EncryptFailed { .. } => ResponseBody::Message {
                message: "Sorry. We couldn't encrypt that file. Please check the logs.",
            },
            PipelineOutcome::Published { .. } => ResponseBody::Message {
                message: "File created",
            },
        }
    }
}

pub struct Pipeline {
    engine: Arc<EncryptionEngine>,
    publisher: ArtifactPublisher,
    recipient: String,
}

impl Pipeline {
    pub fn new(engine: EncryptionEngine, publisher: ArtifactPublisher, recipient: String) -> Self {
        Self {
            engine: Arc::new(engine),
            publisher,
            recipient,
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn publisher(&self) -> &ArtifactPublisher {
        &self.publisher
    }

    /// Run one upload to completion.
    pub async fn process(&self, identifier: Option<&str>, payload: Plaintext) -> PipelineOutcome {
        if payload.is_empty() {
            debug!(stage = ?Stage::Rejected, "Empty request body");
            return PipelineOutcome::Rejected {
                reason: Rejection::EmptyBody,
                diagnostic: None,
            };
        }

        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            debug!(stage = ?Stage::Rejected, "Missing identifier");
            return PipelineOutcome::Rejected {
                reason: Rejection::MissingIdentifier,
                diagnostic: None,
            };
        };

        let key = match StorageKey::derive(self.publisher.location(), identifier) {
            Ok(key) => key,
            Err(e) => {
                warn!(stage = ?Stage::Rejected, error = %e, "Unusable identifier");
                return PipelineOutcome::Rejected {
                    reason: Rejection::InvalidIdentifier,
                    diagnostic: Some(e.to_string()),
                };
            }
        };

        debug!(stage = ?Stage::Received, minion = identifier, "Request accepted");
        info!(minion = identifier, key = %key, bytes = payload.len(), "Creating sealed object");

        debug!(stage = ?Stage::Encrypting, "Sealing payload");
        let engine = Arc::clone(&self.engine);
        let recipient = self.recipient.clone();
        let result =
            match tokio::task::spawn_blocking(move || engine.encrypt(&recipient, payload)).await {
                Ok(result) => result,
                Err(e) => {
                    error!(stage = ?Stage::EncryptFailed, error = %e, "Encryption task aborted");
                    return PipelineOutcome::EncryptFailed {
                        failure: None,
                        diagnostic: format!("Encryption task aborted: {e}"),
                    };
                }
            };

        let ciphertext = match (result.ok, result.ciphertext) {
            (true, Some(ciphertext)) => ciphertext,
            (ok, _) => {
                let diagnostic = match (ok, result.diagnostic) {
                    (true, _) => "Engine reported success without ciphertext".to_string(),
                    (false, Some(d)) => d,
                    (false, None) => "Engine reported failure without detail".to_string(),
                };
                error!(stage = ?Stage::EncryptFailed, minion = identifier, %diagnostic, "Could not encrypt");
                return PipelineOutcome::EncryptFailed {
                    failure: result.failure,
                    diagnostic,
                };
            }
        };
        debug!(stage = ?Stage::Encrypted, bytes = ciphertext.len(), "Payload sealed");

        debug!(stage = ?Stage::Publishing, key = %key, "Publishing");
        let outcome = self.publisher.publish(&key, ciphertext).await;
        if !outcome.ok {
            let diagnostic = outcome
                .diagnostic
                .unwrap_or_else(|| "Publisher reported failure without detail".to_string());
            error!(stage = ?Stage::PublishFailed, minion = identifier, key = %outcome.key, %diagnostic, "Could not store");
            return PipelineOutcome::PublishFailed {
                key: outcome.key,
                failure: outcome.failure,
                diagnostic,
            };
        }

        debug!(stage = ?Stage::Published, key = %outcome.key, "Done");
        PipelineOutcome::Published {
            key: outcome.key,
            size: outcome.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression;
    use crate::crypto::envelope;
    use crate::engine::DEFAULT_CHUNKED_THRESHOLD;
    use crate::error::{LogsealError, Result};
    use crate::keyring::Keyring;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{ObjectStore, StorageLocation, UploadResult};
    use async_trait::async_trait;
    use rand::rngs::OsRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use x25519_dalek::{PublicKey, StaticSecret};

    const RECIPIENT: &str = "ops@example.com";

    struct Harness {
        pipeline: Arc<Pipeline>,
        store: Arc<MemoryStore>,
        secret: StaticSecret,
        location: StorageLocation,
    }

    impl Harness {
        fn new(recipient: &str) -> Self {
            let secret = StaticSecret::random_from_rng(OsRng);
            let ring = Keyring::from_entries([(RECIPIENT.to_string(), PublicKey::from(&secret))])
                .unwrap();
            let store = Arc::new(MemoryStore::new());
            let location = StorageLocation::new("logs", Some("minions".into()));

            let engine = EncryptionEngine::new(Arc::new(ring), DEFAULT_CHUNKED_THRESHOLD);
            let publisher = ArtifactPublisher::new(store.clone(), location.clone());
            let pipeline = Arc::new(Pipeline::new(engine, publisher, recipient.to_string()));

            Self {
                pipeline,
                store,
                secret,
                location,
            }
        }

        fn stored_plaintext(&self, identifier: &str) -> Vec<u8> {
            let key = StorageKey::derive(&self.location, identifier).unwrap();
            let sealed = self.store.get(&self.location, &key).unwrap();
            let compressed = envelope::open(&self.secret, &sealed).unwrap();
            compression::decompress(&compressed).unwrap()
        }
    }

    struct DownStore {
        puts: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }

        async fn check(&self, _location: &StorageLocation) -> Result<()> {
            Ok(())
        }

        async fn put(
            &self,
            _location: &StorageLocation,
            _key: &StorageKey,
            _data: Vec<u8>,
        ) -> Result<UploadResult> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Err(LogsealError::Transport("connection refused".into()))
        }
    }

    fn payload(bytes: &[u8]) -> Plaintext {
        Plaintext::from(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_roundtrip_through_storage() {
        let h = Harness::new(RECIPIENT);
        let log = b"Oct 17 11:22:33 web-01 nginx: GET /healthz 200\n".repeat(20);

        let outcome = h.pipeline.process(Some("web-01"), payload(&log)).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.status(), StatusCode::CREATED);
        assert_eq!(
            outcome.body(),
            ResponseBody::Message {
                message: "File created"
            }
        );
        match outcome {
            PipelineOutcome::Published { key, .. } => assert_eq!(key, "minions/web-01.sealed"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(h.stored_plaintext("web-01"), log);
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let h = Harness::new(RECIPIENT);
        let outcome = h.pipeline.process(Some("web-01"), payload(b"")).await;

        assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            outcome.body(),
            ResponseBody::Error {
                error: "No post data found!"
            }
        );
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_identifier_rejected() {
        let h = Harness::new(RECIPIENT);
        for identifier in [None, Some("")] {
            let outcome = h.pipeline.process(identifier, payload(b"data")).await;
            assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                outcome.body(),
                ResponseBody::Error {
                    error: "Missing param: minion"
                }
            );
        }
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_messages_name_the_parameter() {
        let h = Harness::new(RECIPIENT);
        for identifier in [None, Some("../x")] {
            let outcome = h.pipeline.process(identifier, payload(b"data")).await;
            match outcome.body() {
                ResponseBody::Error { error } => assert!(error.ends_with(IDENTIFIER_PARAM)),
                other => panic!("unexpected body: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_body_checked_before_identifier() {
        let h = Harness::new(RECIPIENT);
        let outcome = h.pipeline.process(None, payload(b"")).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Rejected {
                reason: Rejection::EmptyBody,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_traversal_identifier_rejected() {
        let h = Harness::new(RECIPIENT);
        let outcome = h.pipeline.process(Some("../../etc"), payload(b"data")).await;

        assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(
            outcome,
            PipelineOutcome::Rejected {
                reason: Rejection::InvalidIdentifier,
                ..
            }
        ));
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_recipient_never_publishes() {
        let h = Harness::new("ghost@example.com");
        let outcome = h.pipeline.process(Some("web-01"), payload(b"data")).await;

        assert_eq!(outcome.stage(), Stage::EncryptFailed);
        assert_eq!(outcome.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            outcome.body(),
            ResponseBody::Message {
                message: "Sorry. We couldn't encrypt that file. Please check the logs."
            }
        );
        match outcome {
            PipelineOutcome::EncryptFailed { failure, .. } => {
                assert_eq!(failure, Some(EncryptFailure::KeyResolution))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_distinct_from_encrypt_failure() {
        let secret = StaticSecret::random_from_rng(OsRng);
        let ring =
            Keyring::from_entries([(RECIPIENT.to_string(), PublicKey::from(&secret))]).unwrap();
        let store = Arc::new(DownStore {
            puts: AtomicUsize::new(0),
        });
        let location = StorageLocation::new("logs", None);
        let pipeline = Pipeline::new(
            EncryptionEngine::new(Arc::new(ring), DEFAULT_CHUNKED_THRESHOLD),
            ArtifactPublisher::new(store.clone(), location),
            RECIPIENT.to_string(),
        );

        let outcome = pipeline.process(Some("web-01"), payload(b"data")).await;

        assert_eq!(outcome.stage(), Stage::PublishFailed);
        assert_eq!(outcome.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            outcome.body(),
            ResponseBody::Message {
                message: "Sorry. We couldn't encrypt that file. Please try again later."
            }
        );
        match outcome {
            PipelineOutcome::PublishFailed {
                failure,
                diagnostic,
                key,
            } => {
                assert_eq!(failure, Some(PublishFailure::Transport));
                assert!(diagnostic.contains("connection refused"));
                assert_eq!(key, "web-01.sealed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Exactly one attempt.
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let h = Harness::new(RECIPIENT);

        assert!(h
            .pipeline
            .process(Some("db-02"), payload(b"first shipment"))
            .await
            .is_success());
        assert!(h
            .pipeline
            .process(Some("db-02"), payload(b"second shipment"))
            .await
            .is_success());

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.stored_plaintext("db-02"), b"second shipment");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_do_not_cross() {
        let h = Harness::new(RECIPIENT);

        let mut handles = Vec::new();
        for i in 0..16 {
            let pipeline = Arc::clone(&h.pipeline);
            handles.push(tokio::spawn(async move {
                let identifier = format!("host-{i:02}");
                let body = format!("log line from {identifier}\n").repeat(100 + i);
                pipeline
                    .process(Some(identifier.as_str()), Plaintext::from(body.into_bytes()))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }

        assert_eq!(h.store.len(), 16);
        for i in 0..16 {
            let identifier = format!("host-{i:02}");
            let expected = format!("log line from {identifier}\n").repeat(100 + i);
            assert_eq!(h.stored_plaintext(&identifier), expected.into_bytes());
        }
    }
}
