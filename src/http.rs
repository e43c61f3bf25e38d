//! Small helpers shared by the HTTP capability clients.

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;
use url::Url;

const USER_AGENT: &str = concat!("eventcam/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// A response came back with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFailure {
    pub status: u16,
    pub message: String,
}

impl StatusFailure {
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Build the shared HTTP client. `reqwest::Client` is `Arc`-backed, so every
/// capability client gets a cheap clone of this one.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Join `path` onto `base`, treating `base` as a directory even when it lacks
/// a trailing slash (`https://x.example/api` + `v1/a` => `https://x.example/api/v1/a`).
pub fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
}

/// Pass a successful response through, or turn an error status into a
/// [`StatusFailure`] carrying the service's error text.
pub async fn check_status(response: Response) -> Result<Response, StatusFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StatusFailure {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull a human-readable message out of a JSON error body, falling back to the
/// (truncated) raw text. Auth, REST and upload services all spell it differently.
pub fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(s)) = inner.get("message") {
                        return s.clone();
                    }
                }
                _ => {}
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response>".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
