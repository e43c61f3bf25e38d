//! Object storage capability: accepts image bytes, returns a stable
//! [`MediaReference`]. The HTTP implementation speaks the unsigned-upload
//! protocol of Cloudinary-style media services.

pub mod error;

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

pub use self::error::StorageError;
use crate::http::check_status;
use crate::types::MediaReference;

/// Image bytes ready for upload, with the name and content type inferred
/// from the local file they came from.
#[derive(Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

impl std::fmt::Debug for MediaUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaUpload")
            .field("len", &self.bytes.len())
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl MediaUpload {
    /// Read a local file into an upload.
    pub async fn read(path: &Path) -> Result<Self, StorageError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        Ok(Self {
            bytes,
            filename,
            content_type: content_type_for(path),
        })
    }
}

/// Content type from the file extension; unknown extensions upload as raw bytes.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// The object-storage capability: one upload per call, no retries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store_media(&self, upload: MediaUpload) -> Result<MediaReference, StorageError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    public_id: Option<String>,
}

/// Unsigned multipart upload (`file` + `upload_preset`); the response's
/// `public_id` is the media reference.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    upload_url: Url,
    upload_preset: String,
}

impl HttpObjectStore {
    pub fn new(client: Client, upload_url: Url, upload_preset: impl Into<String>) -> Self {
        Self {
            client,
            upload_url,
            upload_preset: upload_preset.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn store_media(&self, upload: MediaUpload) -> Result<MediaReference, StorageError> {
        if upload.bytes.is_empty() {
            return Err(StorageError::EmptyPayload);
        }

        let size = upload.bytes.len();
        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(upload.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        tracing::debug!(bytes = size, "POST {}", self.upload_url);
        let response = self
            .client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = check_status(response).await?.json().await?;

        body.public_id
            .and_then(|id| MediaReference::new(id).ok())
            .ok_or(StorageError::MissingReference)
    }
}
