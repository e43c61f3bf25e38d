//! Camera capability. A capture is a local image file owned by whoever holds
//! the [`Capture`]; the camera returns `None` when the shutter produced nothing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

/// A still image the camera wrote to local storage.
#[derive(Debug, PartialEq, Eq)]
pub struct Capture {
    path: PathBuf,
}

impl Capture {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the local artifact once its bytes are stored remotely.
    pub async fn release(self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Take a picture. `None` means no artifact (e.g. the user cancelled).
    async fn capture(&self) -> Option<Capture>;
}

/// File-backed camera: each shutter takes the next loaded source image and
/// copies it into the spool directory, the way a device camera writes a new
/// file per shot. With nothing loaded the shutter is a cancel.
#[derive(Debug)]
pub struct FileCamera {
    spool_dir: PathBuf,
    loaded: Mutex<VecDeque<PathBuf>>,
}

impl FileCamera {
    pub fn new(spool_dir: PathBuf) -> Self {
        Self {
            spool_dir,
            loaded: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue `source` to be produced by the next shutter.
    pub fn load(&self, source: PathBuf) {
        self.loaded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(source);
    }

    fn next_source(&self) -> Option<PathBuf> {
        self.loaded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    async fn spool(&self, source: &Path) -> std::io::Result<Option<PathBuf>> {
        let metadata = tokio::fs::metadata(source).await?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Ok(None);
        }
        tokio::fs::create_dir_all(&self.spool_dir).await?;
        let mut name = Uuid::new_v4().to_string();
        if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        let target = self.spool_dir.join(name);
        tokio::fs::copy(source, &target).await?;
        Ok(Some(target))
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn capture(&self) -> Option<Capture> {
        let source = self.next_source()?;
        match self.spool(&source).await {
            Ok(Some(path)) => {
                tracing::debug!(source = %source.display(), path = %path.display(), "Captured image");
                Some(Capture::new(path))
            }
            Ok(None) => {
                tracing::info!(source = %source.display(), "Source image is empty, nothing captured");
                None
            }
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "Capture failed");
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("eventcam")
            .join("camera_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_nothing_loaded_is_cancel() {
        let camera = FileCamera::new(test_dir("cancel").join("spool"));
        assert!(camera.capture().await.is_none());
    }

    #[tokio::test]
    async fn test_capture_copies_into_spool() {
        let dir = test_dir("copy");
        let source = dir.join("photo.jpg");
        std::fs::write(&source, b"jpeg").unwrap();
        let camera = FileCamera::new(dir.join("spool"));
        camera.load(source.clone());

        let capture = camera.capture().await.unwrap();
        assert!(capture.path().starts_with(dir.join("spool")));
        assert_eq!(capture.path().extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(capture.path()).unwrap(), b"jpeg");

        // One shutter per loaded source
        assert!(camera.capture().await.is_none());

        let spooled = capture.path().to_path_buf();
        capture.release().await.unwrap();
        assert!(!spooled.exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_missing_or_empty_source_is_cancel() {
        let dir = test_dir("missing");
        let empty = dir.join("empty.jpg");
        std::fs::write(&empty, b"").unwrap();
        let camera = FileCamera::new(dir.join("spool"));
        camera.load(dir.join("nope.jpg"));
        camera.load(empty);
        assert!(camera.capture().await.is_none());
        assert!(camera.capture().await.is_none());
    }

    #[tokio::test]
    async fn test_release_missing_file_ok() {
        let capture = Capture::new(PathBuf::from("/nonexistent/eventcam/x.jpg"));
        capture.release().await.unwrap();
    }
}
