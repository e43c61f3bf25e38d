use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::session::Session;
use crate::types::SubjectId;

/// Response from `/signup` (anonymous sign-in) and `/token` (refresh).
/// Not `Debug`: it carries raw tokens.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: SubjectId,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl TokenResponse {
    /// Convert into the persisted session form. An absolute `expires_at`
    /// wins over the relative `expires_in`.
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });
        Session {
            subject: self.user.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_signup_response_deserialize() {
        let json = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1900000000,
            "refresh_token": "r1",
            "user": {"id": "u1", "aud": "authenticated", "is_anonymous": true}
        }"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(resp.user.is_anonymous);
        let session = resp.into_session(Utc::now());
        assert_eq!(session.subject.as_str(), "u1");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_expires_in_fallback() {
        let json = r#"{"access_token": "jwt", "expires_in": 60, "user": {"id": "u2"}}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let session = resp.into_session(now);
        assert_eq!(session.expires_at, Some(now + chrono::Duration::seconds(60)));
        assert!(session.refresh_token.is_none());
    }

    #[test]
    fn test_missing_user_fails() {
        let json = r#"{"access_token": "jwt"}"#;
        assert!(serde_json::from_str::<TokenResponse>(json).is_err());
    }
}
