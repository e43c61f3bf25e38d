use thiserror::Error;

use crate::gallery::GalleryError;
use crate::storage::StorageError;
use crate::types::MediaReference;

/// Outcome of a failed capture run. Each variant names the step that failed;
/// nothing is retried automatically.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The camera produced no artifact (e.g. the user cancelled).
    #[error("No photo was captured")]
    NoPhotoCaptured,

    #[error("Upload failed: {0}")]
    UploadFailed(#[source] StorageError),

    /// No identity was available after capture; nothing was uploaded.
    #[error("No identity available to upload and register the photo")]
    NoIdentity,

    /// The media was uploaded but no asset row was written; `media_reference`
    /// is orphaned in object storage.
    #[error("Registering uploaded media {media_reference} failed: {source}")]
    RegistrationFailed {
        media_reference: MediaReference,
        #[source]
        source: GalleryError,
    },
}

impl PipelineError {
    /// Whether the caller may reasonably run the whole pipeline again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::NoIdentity)
    }

    /// Whether the failure looks like a transient service condition.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::UploadFailed(e) => e.is_transient(),
            PipelineError::RegistrationFailed { source, .. } => source.is_transient(),
            PipelineError::NoPhotoCaptured | PipelineError::NoIdentity => false,
        }
    }

    /// The uploaded media left without an asset row, if any.
    pub fn orphaned_reference(&self) -> Option<&MediaReference> {
        match self {
            PipelineError::RegistrationFailed {
                media_reference, ..
            } => Some(media_reference),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(PipelineError::NoPhotoCaptured.is_recoverable());
        assert!(PipelineError::UploadFailed(StorageError::EmptyPayload).is_recoverable());
        assert!(!PipelineError::NoIdentity.is_recoverable());
        let registration = PipelineError::RegistrationFailed {
            media_reference: MediaReference::new("m1").unwrap(),
            source: GalleryError::EmptyInsert,
        };
        assert!(registration.is_recoverable());
        assert_eq!(registration.orphaned_reference().unwrap().as_str(), "m1");
    }

    #[test]
    fn test_transient_follows_source() {
        let upload = PipelineError::UploadFailed(StorageError::HttpStatus {
            status: 503,
            message: String::new(),
        });
        assert!(upload.is_transient());
        let registration = PipelineError::RegistrationFailed {
            media_reference: MediaReference::new("m1").unwrap(),
            source: GalleryError::HttpStatus {
                status: 403,
                message: String::new(),
            },
        };
        assert!(!registration.is_transient());
        assert!(PipelineError::UploadFailed(StorageError::EmptyPayload)
            .orphaned_reference()
            .is_none());
    }
}
