/// Process-wide configuration.
///
/// Built once from the command line and environment, validated, and then
/// only ever read. Changing any of it means restarting the process.
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use crate::engine::DEFAULT_CHUNKED_THRESHOLD;
use crate::error::{LogsealError, Result};
use crate::storage::s3::S3Config;
use crate::storage::StorageLocation;

pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Command-line / environment arguments shared by `serve` and `check`.
#[derive(Args, Clone)]
pub struct ServiceArgs {
    /// Recipient id in the keyring; logs are sealed to this key
    #[arg(long, env = "LOGSEAL_RECIPIENT")]
    pub recipient: String,

    /// Path to the JSON keyring holding recipient public keys
    #[arg(long, env = "LOGSEAL_KEYRING")]
    pub keyring: PathBuf,

    /// Bucket to upload sealed logs to (no "s3://" prefix)
    #[arg(long, env = "LOGSEAL_BUCKET")]
    pub bucket: String,

    /// Key prefix prepended to every object, e.g. "logs"
    #[arg(long, env = "LOGSEAL_PREFIX")]
    pub prefix: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3-compatible endpoint (e.g., MinIO)
    #[arg(long, env = "LOGSEAL_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Static access key id; the default AWS credential chain is used if unset
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Static secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Address to listen on
    #[arg(long, env = "LOGSEAL_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "LOGSEAL_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Compressed size above which bodies are sealed in chunks, in bytes
    #[arg(long, env = "LOGSEAL_CHUNKED_THRESHOLD", default_value_t = DEFAULT_CHUNKED_THRESHOLD)]
    pub chunked_threshold: usize,

    /// Keep sealed objects in process memory instead of uploading to S3
    #[arg(long, env = "LOGSEAL_DRY_RUN")]
    pub dry_run: bool,
}

/// Who logs are sealed to.
#[derive(Debug, Clone)]
pub struct RecipientConfig {
    pub recipient: String,
    pub keyring: PathBuf,
    pub chunked_threshold: usize,
}

/// Where sealed logs go.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub location: StorageLocation,
    pub s3: S3Config,
    /// Use the in-memory store; nothing leaves the process.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub recipient: RecipientConfig,
    pub publisher: PublisherConfig,
    pub server: ServerConfig,
}

impl ServiceArgs {
    pub fn into_config(self) -> Result<AppConfig> {
        let recipient = self.recipient.trim().to_string();
        if recipient.is_empty() {
            return Err(LogsealError::Config("Recipient must not be empty".into()));
        }

        let bucket = self.bucket.trim().trim_start_matches("s3://").trim_end_matches('/');
        if bucket.is_empty() {
            return Err(LogsealError::Config("Bucket must not be empty".into()));
        }
        if bucket.contains('/') {
            return Err(LogsealError::Config(format!(
                "Bucket name {bucket} contains '/'; use --prefix for key prefixes"
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(LogsealError::Config("max_body_bytes must be positive".into()));
        }

        Ok(AppConfig {
            recipient: RecipientConfig {
                recipient,
                keyring: self.keyring,
                chunked_threshold: self.chunked_threshold,
            },
            publisher: PublisherConfig {
                location: StorageLocation::new(bucket, normalize_prefix(self.prefix)?),
                s3: S3Config {
                    region: self.region,
                    endpoint: self.endpoint,
                    access_key_id: self.access_key_id,
                    secret_access_key: self.secret_access_key,
                },
                dry_run: self.dry_run,
            },
            server: ServerConfig {
                listen: self.listen,
                max_body_bytes: self.max_body_bytes,
            },
        })
    }
}

/// Trim surrounding slashes; treat an empty prefix as none; refuse traversal.
pub fn normalize_prefix(prefix: Option<String>) -> Result<Option<String>> {
    let Some(prefix) = prefix else {
        return Ok(None);
    };
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }

    let bad_segment = trimmed
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad_segment || trimmed.contains('\\') || trimmed.chars().any(char::is_control) {
        return Err(LogsealError::Config(format!("Invalid key prefix: {prefix}")));
    }
    Ok(Some(trimmed.to_string()))
}
