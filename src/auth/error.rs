use thiserror::Error;

use crate::http::StatusFailure;

/// Failures of the identity capability. Every variant means "auth unavailable"
/// to a writer: no identity can be produced until the next launch.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service answered with a 4xx (bad key, refresh token revoked, ...).
    #[error("Identity service rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service answered with a 5xx.
    #[error("Identity service unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Invalid identity service URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<StatusFailure> for AuthError {
    fn from(f: StatusFailure) -> Self {
        if f.is_client_error() {
            AuthError::Rejected {
                status: f.status,
                message: f.message,
            }
        } else {
            AuthError::Unavailable {
                status: f.status,
                message: f.message,
            }
        }
    }
}
