use ossvault_core::CryptError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type StorageResult<T> = Result<T, StorageError>;

/// One variant per failing contract operation; the backend or codec failure
/// is kept as the `source`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unable to write file at {location}")]
    UnableToWriteFile {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to read file from {location}")]
    UnableToReadFile {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to delete file at {location}")]
    UnableToDeleteFile {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to delete directory at {location}")]
    UnableToDeleteDirectory {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to create directory at {location}")]
    UnableToCreateDirectory {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to check existence of {location}")]
    UnableToCheckExistence {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to list contents of {location}")]
    UnableToListContents {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to move file from {from} to {to}")]
    UnableToMoveFile {
        from: String,
        to: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to copy file from {from} to {to}")]
    UnableToCopyFile {
        from: String,
        to: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to set visibility for {location}")]
    UnableToSetVisibility {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("unable to retrieve {kind} for {location}")]
    UnableToRetrieveMetadata {
        location: String,
        kind: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("unable to generate URL for {location}")]
    UnableToGenerateUrl {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("config error: {0}")]
    Config(String),

    /// Codec setup failures (bad key, bad chunk size)
    #[error(transparent)]
    Crypt(#[from] CryptError),
}

impl StorageError {
    pub fn write(location: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::UnableToWriteFile {
            location: location.into(),
            source: source.into(),
        }
    }

    pub fn read(location: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::UnableToReadFile {
            location: location.into(),
            source: source.into(),
        }
    }

    pub fn metadata(location: impl Into<String>, kind: &'static str, source: impl Into<BoxError>) -> Self {
        StorageError::UnableToRetrieveMetadata {
            location: location.into(),
            kind,
            source: source.into(),
        }
    }

    /// The codec failure behind this error, if there is one.
    pub fn crypt_cause(&self) -> Option<&CryptError> {
        match self {
            StorageError::Crypt(err) => Some(err),
            _ => std::error::Error::source(self).and_then(|s| s.downcast_ref::<CryptError>()),
        }
    }
}

/// Unwrap a codec failure that travelled through `AsyncRead` as an
/// `io::Error`, so callers see the `CryptError` itself as the cause.
pub(crate) fn io_source(err: std::io::Error) -> BoxError {
    if err
        .get_ref()
        .is_some_and(|inner| inner.is::<CryptError>())
    {
        if let Some(inner) = err.into_inner() {
            return inner;
        }
        return Box::new(std::io::Error::other("stream failed"));
    }
    Box::new(err)
}
