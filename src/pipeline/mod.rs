//! Capture → upload → register.
//!
//! A run takes one photo for an event and makes it visible in that event's
//! gallery. Steps run strictly in order and the first failing step decides the
//! outcome. Nothing is written anywhere until an identity is available. Only a
//! fully registered photo invalidates the event's cached asset list.

pub mod error;

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

pub use self::error::PipelineError;
use crate::auth::{Identity, SessionBootstrap};
use crate::cache::{Invalidate, QueryKey};
use crate::camera::{Camera, Capture};
use crate::gallery::GalleryService;
use crate::ledger::{CaptureLedger, LedgerError};
use crate::storage::{MediaUpload, ObjectStore, StorageError};
use crate::types::{AssetId, EventId, MediaReference};

pub struct CapturePipeline {
    camera: Arc<dyn Camera>,
    store: Arc<dyn ObjectStore>,
    gallery: Arc<dyn GalleryService>,
    bootstrap: Arc<SessionBootstrap>,
    cache: Arc<dyn Invalidate>,
    ledger: Option<Arc<dyn CaptureLedger>>,
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("bootstrap", &self.bootstrap)
            .field("ledger", &self.ledger.is_some())
            .finish_non_exhaustive()
    }
}

/// Log a ledger failure. The ledger never changes a run's outcome.
fn noted(result: Result<(), LedgerError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to update capture ledger");
    }
}

impl CapturePipeline {
    pub fn new(
        camera: Arc<dyn Camera>,
        store: Arc<dyn ObjectStore>,
        gallery: Arc<dyn GalleryService>,
        bootstrap: Arc<SessionBootstrap>,
        cache: Arc<dyn Invalidate>,
    ) -> Self {
        Self {
            camera,
            store,
            gallery,
            bootstrap,
            cache,
            ledger: None,
        }
    }

    /// Record every run in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<dyn CaptureLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Take a photo and register it against `event_id`.
    ///
    /// Returns the new asset's id. Concurrent runs are independent; the
    /// pipeline imposes no ordering between them.
    pub async fn capture_photo_for_event(
        &self,
        event_id: &EventId,
    ) -> Result<AssetId, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("capture", %run_id, %event_id);
        self.run(run_id, event_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, event_id: &EventId) -> Result<AssetId, PipelineError> {
        let Some(capture) = self.camera.capture().await else {
            tracing::info!("Camera produced no photo");
            if let Some(ledger) = &self.ledger {
                noted(ledger.record_cancelled(run_id, event_id).await);
            }
            return Err(PipelineError::NoPhotoCaptured);
        };
        if let Some(ledger) = &self.ledger {
            noted(ledger.record_captured(run_id, event_id, capture.path()).await);
        }

        let Some(identity) = self.bootstrap.current() else {
            tracing::warn!(
                state = ?self.bootstrap.state(),
                path = %capture.path().display(),
                "No identity, keeping local capture"
            );
            if let Some(ledger) = &self.ledger {
                let reason = PipelineError::NoIdentity.to_string();
                noted(ledger.mark_registration_failed(run_id, None, &reason).await);
            }
            return Err(PipelineError::NoIdentity);
        };

        let media_reference = match self.upload(&capture).await {
            Ok(reference) => reference,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    path = %capture.path().display(),
                    "Upload failed, keeping local capture"
                );
                if let Some(ledger) = &self.ledger {
                    noted(ledger.mark_upload_failed(run_id, &e.to_string()).await);
                }
                return Err(PipelineError::UploadFailed(e));
            }
        };
        tracing::debug!(media_reference = %media_reference, "Uploaded");
        if let Some(ledger) = &self.ledger {
            noted(ledger.mark_uploaded(run_id, &media_reference).await);
        }
        let path = capture.path().to_path_buf();
        if let Err(e) = capture.release().await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove local capture");
        }

        self.register(run_id, event_id, &identity, media_reference).await
    }

    async fn upload(&self, capture: &Capture) -> Result<MediaReference, StorageError> {
        let upload = MediaUpload::read(capture.path()).await?;
        self.store.store_media(upload).await
    }

    async fn register(
        &self,
        run_id: Uuid,
        event_id: &EventId,
        identity: &Identity,
        media_reference: MediaReference,
    ) -> Result<AssetId, PipelineError> {
        match self
            .gallery
            .insert_asset(identity, event_id, &media_reference)
            .await
        {
            Ok(asset) => {
                self.cache
                    .invalidate(&QueryKey::EventAssets(event_id.clone()));
                if asset.event_id != *event_id {
                    tracing::warn!(row_event_id = %asset.event_id, "Registered row reports a different event");
                }
                tracing::info!(asset_id = %asset.id, subject = %identity.subject(), "Photo registered");
                if let Some(ledger) = &self.ledger {
                    noted(
                        ledger
                            .mark_registered(run_id, identity.subject(), &asset.id)
                            .await,
                    );
                }
                Ok(asset.id)
            }
            Err(source) => {
                tracing::warn!(
                    error = %source,
                    transient = source.is_transient(),
                    media_reference = %media_reference,
                    "Registration failed, uploaded media is orphaned"
                );
                if let Some(ledger) = &self.ledger {
                    noted(
                        ledger
                            .mark_registration_failed(
                                run_id,
                                Some(identity.subject()),
                                &source.to_string(),
                            )
                            .await,
                    );
                }
                Err(PipelineError::RegistrationFailed {
                    media_reference,
                    source,
                })
            }
        }
    }
}
