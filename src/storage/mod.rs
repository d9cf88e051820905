/// Object storage boundary.
///
/// Everything handed to a store is already sealed; stores never see plaintext.
/// A store performs one attempt per call and reports transport, credential and
/// backend failures as distinct errors.
pub mod memory;
pub mod s3;

use async_trait::async_trait;

use crate::error::{LogsealError, Result};

/// Suffix marking an object as a sealed envelope.
pub const SEALED_SUFFIX: &str = ".sealed";

/// Longest identifier accepted from callers, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Metadata returned after a successful write.
#[derive(Debug, Clone)]
pub struct UploadResult {
    /// Key the object was written under.
    pub storage_key: String,
    /// Content hash (BLAKE3) of the uploaded data.
    pub content_hash: [u8; 32],
    /// Size in bytes of the uploaded data.
    pub size: u64,
}

/// Bucket and optional key prefix, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix,
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}/{}", self.bucket, prefix),
            None => f.write_str(&self.bucket),
        }
    }
}

/// Key an object is stored under inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// `<prefix>/<identifier>.sealed`, or `<identifier>.sealed` without a prefix.
    ///
    /// Same identifier, same key: a later upload replaces the earlier object.
    pub fn derive(location: &StorageLocation, identifier: &str) -> Result<Self> {
        validate_identifier(identifier)?;
        let key = match &location.prefix {
            Some(prefix) => format!("{prefix}/{identifier}{SEALED_SUFFIX}"),
            None => format!("{identifier}{SEALED_SUFFIX}"),
        };
        Ok(Self(key))
    }

    /// Wrap an externally built key. Checked by the publisher before use.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key is non-empty and stays inside `location`'s namespace.
    pub fn is_within(&self, location: &StorageLocation) -> bool {
        if self.0.is_empty() || self.0.starts_with('/') || self.0.contains('\\') {
            return false;
        }
        if self.0.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return false;
        }
        match &location.prefix {
            Some(prefix) => self
                .0
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/')),
            None => true,
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a caller-supplied identifier is safe to embed in a storage key.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(LogsealError::Validation("identifier is empty".into()));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(LogsealError::Validation(format!(
            "identifier is {} bytes (maximum {MAX_IDENTIFIER_LEN})",
            identifier.len()
        )));
    }
    if identifier.starts_with('.') {
        return Err(LogsealError::Validation(
            "identifier must not start with '.'".into(),
        ));
    }
    if identifier
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(LogsealError::Validation(
            "identifier contains a path separator or control character".into(),
        ));
    }
    Ok(())
}

/// Trait for pluggable object stores.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable name of this backend (e.g., "S3").
    fn name(&self) -> &str;

    /// Verify the location exists and the credentials are accepted.
    /// Called once at startup.
    async fn check(&self, location: &StorageLocation) -> Result<()>;

    /// Write `data` under `key`, replacing any existing object. Single attempt.
    async fn put(
        &self,
        location: &StorageLocation,
        key: &StorageKey,
        data: Vec<u8>,
    ) -> Result<UploadResult>;
}
