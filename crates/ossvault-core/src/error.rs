use thiserror::Error;

pub type CryptResult<T> = Result<T, CryptError>;

/// Why an in-flight encrypt/decrypt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Reading the source failed.
    Io,
    /// A chunk (or the header) did not authenticate under the key.
    Authentication,
    /// The source ended before the final chunk.
    Truncated,
    /// Structurally impossible input: trailing data, counter overflow.
    Malformed,
}

#[derive(Debug, Error)]
pub enum CryptError {
    /// Bad chunk size, bad key length, unreadable config. Detected at setup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("encryption failure: {message}")]
    EncryptionFailure {
        kind: FailureKind,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl CryptError {
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        CryptError::EncryptionFailure {
            kind: FailureKind::Io,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        CryptError::EncryptionFailure {
            kind: FailureKind::Authentication,
            message: message.into(),
            source: None,
        }
    }

    pub fn truncated() -> Self {
        CryptError::EncryptionFailure {
            kind: FailureKind::Truncated,
            message: "cannot decrypt: stream truncated".into(),
            source: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CryptError::EncryptionFailure {
            kind: FailureKind::Malformed,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        CryptError::InvalidConfiguration(message.into())
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        CryptError::UnsupportedOperation(operation.into())
    }

    /// A copy without the `source` chain, for reporting the same failure twice.
    pub fn clone_lossy(&self) -> Self {
        match self {
            CryptError::InvalidConfiguration(msg) => CryptError::InvalidConfiguration(msg.clone()),
            CryptError::EncryptionFailure { kind, message, .. } => CryptError::EncryptionFailure {
                kind: *kind,
                message: message.clone(),
                source: None,
            },
            CryptError::UnsupportedOperation(op) => CryptError::UnsupportedOperation(op.clone()),
        }
    }

    /// The failure kind, for `EncryptionFailure` errors.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CryptError::EncryptionFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Lets codec failures travel through `AsyncRead` and back out again.
impl From<CryptError> for std::io::Error {
    fn from(err: CryptError) -> Self {
        let kind = match &err {
            CryptError::InvalidConfiguration(_) => std::io::ErrorKind::InvalidInput,
            CryptError::EncryptionFailure { .. } => std::io::ErrorKind::InvalidData,
            CryptError::UnsupportedOperation(_) => std::io::ErrorKind::Unsupported,
        };
        std::io::Error::new(kind, err)
    }
}
