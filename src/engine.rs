/// Encryption engine: compress, then seal to a named recipient.
///
/// The engine only ever sees public keys. A successful result means the
/// sealed envelope was checked against the exact layout sealing must have
/// produced, not merely that no error surfaced along the way.
use std::sync::Arc;

use tracing::{debug, warn};

use crate::compression;
use crate::crypto::envelope::{self, SealMode};
use crate::crypto::sensitive::Plaintext;
use crate::error::{LogsealError, Result};
use crate::keyring::KeyStore;

/// Default size above which compressed bodies are sealed in chunks.
pub const DEFAULT_CHUNKED_THRESHOLD: usize = 64 * 1024 * 1024;

/// Why an encryption attempt did not produce ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptFailure {
    KeyResolution,
    Compression,
    Encryption,
}

/// Outcome of a single `encrypt` call.
#[derive(Debug)]
pub struct EncryptionResult {
    /// Whether the envelope was produced and verified.
    pub ok: bool,
    /// Sealed envelope (present iff `ok`).
    pub ciphertext: Option<Vec<u8>>,
    /// Operator-facing detail: sizes and recipient fingerprint on success,
    /// the error on failure. Never contains payload bytes.
    pub diagnostic: Option<String>,
    /// Failure category (present iff `!ok`).
    pub failure: Option<EncryptFailure>,
}

impl EncryptionResult {
    fn sealed(ciphertext: Vec<u8>, diagnostic: String) -> Self {
        Self {
            ok: true,
            ciphertext: Some(ciphertext),
            diagnostic: Some(diagnostic),
            failure: None,
        }
    }

    fn failed(err: LogsealError) -> Self {
        let failure = match err {
            LogsealError::KeyResolution(_) => EncryptFailure::KeyResolution,
            LogsealError::Compression(_) => EncryptFailure::Compression,
            _ => EncryptFailure::Encryption,
        };
        Self {
            ok: false,
            ciphertext: None,
            diagnostic: Some(err.to_string()),
            failure: Some(failure),
        }
    }
}

pub struct EncryptionEngine {
    keystore: Arc<dyn KeyStore>,
    chunked_threshold: usize,
}

impl EncryptionEngine {
    pub fn new(keystore: Arc<dyn KeyStore>, chunked_threshold: usize) -> Self {
        Self {
            keystore,
            chunked_threshold,
        }
    }

    /// Compress and seal `plaintext` for `recipient`.
    ///
    /// Takes the plaintext by value; it is wiped as soon as compression is done.
    /// Zero-length plaintext is valid and yields a normal envelope.
    pub fn encrypt(&self, recipient: &str, plaintext: Plaintext) -> EncryptionResult {
        match self.try_encrypt(recipient, plaintext) {
            Ok((ciphertext, diagnostic)) => {
                debug!(recipient, %diagnostic, "Payload sealed");
                EncryptionResult::sealed(ciphertext, diagnostic)
            }
            Err(e) => {
                warn!(recipient, error = %e, "Encryption failed");
                EncryptionResult::failed(e)
            }
        }
    }

    fn try_encrypt(&self, recipient: &str, plaintext: Plaintext) -> Result<(Vec<u8>, String)> {
        let key = self.keystore.resolve(recipient)?;

        let plain_len = plaintext.len();
        let compressed = compression::compress(plaintext.as_bytes())?;
        drop(plaintext);

        let mode = if compressed.len() > self.chunked_threshold {
            SealMode::Chunked
        } else {
            SealMode::Single
        };

        let sealed = envelope::seal(&key.public_key, compressed.as_bytes(), mode)?;
        envelope::check_sealed(&sealed, mode, compressed.len())?;

        let diagnostic = format!(
            "{plain_len} bytes -> {} compressed -> {} sealed ({mode:?}) for {} [{}]",
            compressed.len(),
            sealed.len(),
            key.id,
            key.fingerprint()
        );
        Ok((sealed, diagnostic))
    }
}
