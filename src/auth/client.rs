use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use url::Url;

use super::endpoints::Endpoints;
use super::error::AuthError;
use super::responses::TokenResponse;
use super::session::{Session, SessionStore};
use super::IdentityService;
use crate::http::check_status;

/// Identity capability backed by a GoTrue-compatible auth API, with the
/// session persisted locally so it survives restarts.
pub struct HttpIdentityService {
    client: Client,
    endpoints: Endpoints,
    api_key: String,
    store: SessionStore,
}

impl std::fmt::Debug for HttpIdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityService")
            .field("endpoints", &self.endpoints)
            .field("api_key", &"<redacted>")
            .field("store", &self.store)
            .finish()
    }
}

impl HttpIdentityService {
    pub fn new(
        client: Client,
        backend: &Url,
        api_key: impl Into<String>,
        store: SessionStore,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            client,
            endpoints: Endpoints::for_backend(backend)?,
            api_key: api_key.into(),
            store,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        tracing::debug!("POST {}", self.endpoints.refresh);
        let response = self
            .client
            .post(self.endpoints.refresh.clone())
            .header("apikey", &self.api_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Save `session` locally. The server already holds it, so a local write
    /// failure is logged and the session is still used for this process.
    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session).await {
            tracing::warn!(
                subject = %session.subject,
                path = %self.store.path().display(),
                error = %e,
                "Failed to save session, it will not survive a restart"
            );
        }
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn get_current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.store.load().await? else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            tracing::info!(subject = %session.subject, "Stored session expired and cannot be refreshed");
            self.store.clear().await?;
            return Ok(None);
        };

        tracing::debug!(subject = %session.subject, "Stored session expired, refreshing");
        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.persist(&refreshed).await;
                Ok(Some(refreshed))
            }
            Err(AuthError::Rejected { status, message }) => {
                tracing::info!(status, "Refresh rejected, discarding stored session: {}", message);
                self.store.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_anonymous_session(&self) -> Result<Session, AuthError> {
        tracing::debug!("POST {}", self.endpoints.signup);
        let response = self
            .client
            .post(self.endpoints.signup.clone())
            .header("apikey", &self.api_key)
            .json(&json!({}))
            .send()
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;
        if !token.user.is_anonymous {
            tracing::warn!(subject = %token.user.id, "Sign-up returned a non-anonymous user");
        }
        let session = token.into_session(Utc::now());
        self.persist(&session).await;
        tracing::info!(subject = %session.subject, "Created anonymous session");
        Ok(session)
    }
}
