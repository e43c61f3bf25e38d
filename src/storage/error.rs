use thiserror::Error;

use crate::http::StatusFailure;

/// Typed upload failures. Any of these surfaces from the pipeline as
/// `UploadFailed`; the local capture is left in place.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Refusing to upload an empty payload")]
    EmptyPayload,

    #[error("Upload rejected (HTTP {status}): {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Upload response carried no usable reference id")]
    MissingReference,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StatusFailure> for StorageError {
    fn from(f: StatusFailure) -> Self {
        StorageError::HttpStatus {
            status: f.status,
            message: f.message,
        }
    }
}

impl StorageError {
    /// Whether the same upload could plausibly succeed if tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            StorageError::Http(_) => true,
            StorageError::EmptyPayload | StorageError::MissingReference | StorageError::Io(_) => {
                false
            }
        }
    }
}
