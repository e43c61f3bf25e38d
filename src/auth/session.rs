use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::error::AuthError;
use crate::types::SubjectId;

/// Name of the persisted session file inside the data directory.
pub const SESSION_FILE: &str = "session.json";

/// Sessions this close to expiry are treated as expired so a request does not
/// race the server-side cutoff.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A session issued by the identity service, in the form persisted on disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject: SubjectId,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("subject", &self.subject)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    /// Whether the access token is expired (or about to be) at `now`.
    /// Sessions without an expiry never expire client-side.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS))
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.subject.clone(), self.access_token.clone())
    }
}

/// The device identity handed to writers: subject plus the credential that
/// authorizes requests on its behalf.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    subject: SubjectId,
    credential: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl Identity {
    pub fn new(subject: SubjectId, credential: impl Into<String>) -> Self {
        Self {
            subject,
            credential: credential.into(),
        }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

/// Reads and writes the session file so the identity survives restarts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session. A missing or unreadable file is "no session",
    /// not an error: the caller will create a fresh one.
    pub async fn load(&self) -> Result<Option<Session>, AuthError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Session file does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Session>(&contents) {
            Ok(session) => {
                tracing::debug!("Loaded session from {}", self.path.display());
                Ok(Some(session))
            }
            Err(e) => {
                tracing::info!("Session file corrupt, starting fresh: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, json).await?;
        #[cfg(unix)]
        {
            // Session files hold bearer tokens: owner-only
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }
        tracing::debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("eventcam")
            .join("session_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn session(expires_at: Option<DateTime<Utc>>) -> Session {
        Session {
            subject: SubjectId::new("u1").unwrap(),
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = SessionStore::new(&test_dir("missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = SessionStore::new(&test_dir("save_load"));
        let s = session(Some(Utc::now()));
        store.save(&s).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_none() {
        let dir = test_dir("corrupt");
        std::fs::write(dir.join(SESSION_FILE), "{not json").unwrap();
        let store = SessionStore::new(&dir);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_and_tolerates_missing() {
        let store = SessionStore::new(&test_dir("clear"));
        store.save(&session(None)).await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.path().exists());
        store.clear().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let store = SessionStore::new(&test_dir("perms"));
        store.save(&session(None)).await.unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!session(None).is_expired(now));
        assert!(session(Some(now - chrono::Duration::hours(1))).is_expired(now));
        assert!(session(Some(now + chrono::Duration::seconds(30))).is_expired(now));
        assert!(!session(Some(now + chrono::Duration::hours(1))).is_expired(now));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let s = session(None);
        let out = format!("{:?} {:?}", s, s.identity());
        assert!(!out.contains("secret"));
        assert!(out.contains("u1"));
    }
}
