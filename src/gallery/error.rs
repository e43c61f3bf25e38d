use thiserror::Error;

use crate::http::StatusFailure;

/// Failures of the event/asset query capability.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Database request failed (HTTP {status}): {message}")]
    HttpStatus { status: u16, message: String },

    /// An insert with `return=representation` came back without the row.
    #[error("Database returned no row for the inserted asset")]
    EmptyInsert,

    #[error("Invalid database URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<StatusFailure> for GalleryError {
    fn from(f: StatusFailure) -> Self {
        GalleryError::HttpStatus {
            status: f.status,
            message: f.message,
        }
    }
}

impl GalleryError {
    /// Whether the same request could plausibly succeed if tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            GalleryError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            GalleryError::Http(e) => !e.is_decode(),
            GalleryError::EmptyInsert | GalleryError::Url(_) => false,
        }
    }
}
