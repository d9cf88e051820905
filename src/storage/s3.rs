/// S3 object store.
///
/// Works against AWS S3 and S3-compatible gateways. Objects are sealed before
/// they get here, so the bucket never holds plaintext.
///
/// Credentials come either from explicit keys or from the default AWS chain
/// (environment, profile, instance role). Either way they are resolved once
/// at startup so a missing credential fails the process instead of every request.
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use tracing::{debug, info};

use super::{ObjectStore, StorageKey, StorageLocation, UploadResult};
use crate::crypto::hash;
use crate::error::{LogsealError, Result};

/// Service error codes that mean the credentials were refused.
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidToken",
    "SignatureDoesNotMatch",
    "TokenRefreshRequired",
];

/// Connection settings for the S3 client.
#[derive(Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint for S3-compatible storage.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Build a client and make sure credentials can actually be produced.
    pub async fn connect(config: &S3Config) -> Result<Self> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "logseal-static",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(LogsealError::Config(
                    "Both an access key id and a secret access key are required".into(),
                ))
            }
        }

        let sdk_config = loader.load().await;

        let provider = sdk_config.credentials_provider().ok_or_else(|| {
            LogsealError::Config("No AWS credential provider is configured".into())
        })?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| LogsealError::Config(format!("AWS credentials unavailable: {e}")))?;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {endpoint}");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
        })
    }
}

/// Sort an SDK failure into the publish error taxonomy.
fn classify<E>(err: SdkError<E, HttpResponse>) -> LogsealError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            let auth_code = ctx
                .err()
                .code()
                .is_some_and(|code| AUTH_ERROR_CODES.contains(&code));
            if auth_code || status == 401 || status == 403 {
                LogsealError::Auth(detail)
            } else {
                LogsealError::BackendRejected(detail)
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            LogsealError::Transport(detail)
        }
        _ => LogsealError::Transport(detail),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        "S3"
    }

    async fn check(&self, location: &StorageLocation) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&location.bucket)
            .send()
            .await
            .map_err(|e| match classify(e) {
                LogsealError::BackendRejected(detail) => LogsealError::Config(format!(
                    "Bucket {} is not usable: {detail}",
                    location.bucket
                )),
                other => LogsealError::Config(format!(
                    "Bucket {} could not be checked: {other}",
                    location.bucket
                )),
            })?;

        info!(bucket = %location.bucket, "Bucket is accessible");
        Ok(())
    }

    async fn put(
        &self,
        location: &StorageLocation,
        key: &StorageKey,
        data: Vec<u8>,
    ) -> Result<UploadResult> {
        let content_hash = hash::hash(&data);
        let size = data.len() as u64;

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(key.as_str())
            .content_type("application/octet-stream")
            .content_length(size as i64)
            .metadata("sealed-at", Utc::now().to_rfc3339())
            .metadata("content-blake3", hex::encode(content_hash))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(classify)?;

        Ok(UploadResult {
            storage_key: key.to_string(),
            content_hash,
            size,
        })
    }
}
