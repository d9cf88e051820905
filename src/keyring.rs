/// Recipient public keys.
///
/// The keyring is a JSON file provisioned by the operator. It is loaded once
/// at startup and never written. Only public keys live here; the matching
/// private keys are held by whoever reads the logs back.
///
/// ```json
/// {
///   "version": 1,
///   "recipients": [
///     { "id": "ops@example.com", "public_key": "<64 hex chars>" }
///   ]
/// }
/// ```
use std::collections::HashMap;
use std::path::Path;

use rand::rngs::OsRng;
use serde::Deserialize;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::crypto::hash;
use crate::error::{LogsealError, Result};

/// Source of recipient keys for the encryption engine.
pub trait KeyStore: Send + Sync {
    /// Look up a recipient's public key.
    fn resolve(&self, recipient: &str) -> Result<RecipientKey>;

    /// Ids of every recipient this store can resolve.
    fn recipients(&self) -> Vec<String>;
}

/// A resolved recipient.
#[derive(Clone)]
pub struct RecipientKey {
    pub id: String,
    pub public_key: PublicKey,
}

impl RecipientKey {
    /// Short hex fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&hash::hash(self.public_key.as_bytes())[..8])
    }

    /// Fail unless the key can take part in an X25519 exchange.
    pub fn ensure_usable(&self) -> Result<()> {
        if is_contributory(&self.public_key) {
            Ok(())
        } else {
            Err(LogsealError::KeyResolution(format!(
                "Recipient {} has a low-order public key",
                self.id
            )))
        }
    }
}

impl std::fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKey")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// On-disk keyring format.
#[derive(Deserialize)]
pub struct KeyringFile {
    pub version: u32,
    pub recipients: Vec<KeyringEntry>,
}

impl KeyringFile {
    pub const CURRENT_VERSION: u32 = 1;
}

#[derive(Deserialize)]
pub struct KeyringEntry {
    pub id: String,
    /// X25519 public key (hex-encoded, 32 bytes).
    pub public_key: String,
}

/// Immutable in-memory keyring.
pub struct Keyring {
    keys: HashMap<String, PublicKey>,
}

impl Keyring {
    /// Load and validate a keyring file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(LogsealError::Keyring(format!(
                "Keyring could not be found at {}. Import the recipient public key first",
                path.display()
            )));
        }
        let raw = std::fs::read(path).map_err(|e| {
            LogsealError::Keyring(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let file: KeyringFile =
            serde_json::from_slice(raw).map_err(|e| LogsealError::Serialization(e.to_string()))?;

        if file.version != KeyringFile::CURRENT_VERSION {
            return Err(LogsealError::Keyring(format!(
                "Unsupported keyring version: {}",
                file.version
            )));
        }

        let mut entries = Vec::with_capacity(file.recipients.len());
        for entry in file.recipients {
            let key = parse_public_key(&entry.public_key).map_err(|e| {
                LogsealError::Keyring(format!("Recipient {}: {e}", entry.id))
            })?;
            if !is_contributory(&key) {
                return Err(LogsealError::Keyring(format!(
                    "Recipient {}: public key is a low-order point",
                    entry.id
                )));
            }
            entries.push((entry.id, key));
        }
        Self::from_entries(entries)
    }

    /// Build a keyring from already-parsed keys.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, PublicKey)>) -> Result<Self> {
        let mut keys = HashMap::new();
        for (id, key) in entries {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(LogsealError::Keyring("Recipient id is empty".into()));
            }
            if keys.insert(id.clone(), key).is_some() {
                return Err(LogsealError::Keyring(format!("Duplicate recipient: {id}")));
            }
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for Keyring {
    fn resolve(&self, recipient: &str) -> Result<RecipientKey> {
        self.keys
            .get(recipient)
            .map(|key| RecipientKey {
                id: recipient.to_string(),
                public_key: *key,
            })
            .ok_or_else(|| LogsealError::KeyResolution(format!("No key for recipient {recipient}")))
    }

    fn recipients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Trial exchange with a throwaway secret; low-order points yield an all-zero secret.
fn is_contributory(key: &PublicKey) -> bool {
    EphemeralSecret::random_from_rng(OsRng)
        .diffie_hellman(key)
        .was_contributory()
}

fn parse_public_key(hex_key: &str) -> std::result::Result<PublicKey, String> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| format!("invalid hex: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("public key is {} bytes, expected 32", b.len()))?;
    Ok(PublicKey::from(bytes))
}
