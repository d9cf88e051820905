use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogsealError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Recipient key could not be resolved: {0}")]
    KeyResolution(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Storage transport error: {0}")]
    Transport(String),

    #[error("Storage credentials rejected: {0}")]
    Auth(String),

    #[error("Storage backend rejected the write: {0}")]
    BackendRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which part of the system an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Caller sent a malformed request.
    Validation,
    /// Operator misconfiguration, fatal before serving.
    Startup,
    /// The payload could not be compressed or sealed.
    Encrypt,
    /// The sealed payload could not be written to storage.
    Publish,
}

impl LogsealError {
    pub fn stage(&self) -> FailureStage {
        match self {
            LogsealError::Validation(_) => FailureStage::Validation,
            LogsealError::Config(_)
            | LogsealError::Keyring(_)
            | LogsealError::Io(_)
            | LogsealError::Serialization(_) => FailureStage::Startup,
            LogsealError::KeyResolution(_)
            | LogsealError::Encryption(_)
            | LogsealError::Compression(_) => FailureStage::Encrypt,
            LogsealError::Transport(_)
            | LogsealError::Auth(_)
            | LogsealError::BackendRejected(_) => FailureStage::Publish,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogsealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_and_publish_stages_are_distinct() {
        assert_eq!(
            LogsealError::Encryption("x".into()).stage(),
            FailureStage::Encrypt
        );
        assert_eq!(
            LogsealError::KeyResolution("x".into()).stage(),
            FailureStage::Encrypt
        );
        assert_eq!(
            LogsealError::Transport("x".into()).stage(),
            FailureStage::Publish
        );
        assert_eq!(LogsealError::Auth("x".into()).stage(), FailureStage::Publish);
        assert_eq!(
            LogsealError::Keyring("x".into()).stage(),
            FailureStage::Startup
        );
    }
}
