//! Event/asset query capability over a PostgREST-style REST API
//! (`{backend}/rest/v1/...`). Each call is a single round trip; caching lives
//! in [`crate::cache`].

pub mod error;
pub mod types;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use url::Url;

pub use self::error::GalleryError;
pub use self::types::{Asset, Event};
use self::types::NewAsset;
use crate::auth::Identity;
use crate::http::{check_status, join_path};
use crate::types::{EventId, MediaReference};

/// Reads and writes against the event database. Every call is authorized as
/// `identity`; registration records `identity`'s subject as the contributor.
#[async_trait]
pub trait GalleryService: Send + Sync {
    /// Events the identity belongs to, newest first.
    async fn list_events_for_identity(&self, identity: &Identity)
        -> Result<Vec<Event>, GalleryError>;

    /// Assets registered against `event_id`, newest first.
    async fn list_assets_for_event(
        &self,
        identity: &Identity,
        event_id: &EventId,
    ) -> Result<Vec<Asset>, GalleryError>;

    /// Append one asset row. Not idempotent: repeating the call creates a
    /// second row.
    async fn insert_asset(
        &self,
        identity: &Identity,
        event_id: &EventId,
        media_reference: &MediaReference,
    ) -> Result<Asset, GalleryError>;
}

pub struct PostgrestGallery {
    client: Client,
    rest_root: Url,
    api_key: String,
}

impl std::fmt::Debug for PostgrestGallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestGallery")
            .field("rest_root", &self.rest_root)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl PostgrestGallery {
    pub fn new(
        client: Client,
        backend: &Url,
        api_key: impl Into<String>,
    ) -> Result<Self, GalleryError> {
        Ok(Self {
            client,
            rest_root: join_path(backend, "rest/v1/")?,
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url, GalleryError> {
        let mut url = self.rest_root.join(table)?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, identity: &Identity) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(identity.credential())
    }
}

#[async_trait]
impl GalleryService for PostgrestGallery {
    async fn list_events_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Event>, GalleryError> {
        let url = self.table_url(
            "events",
            &[
                ("select", "*,event_memberships!inner(user_id)".to_string()),
                (
                    "event_memberships.user_id",
                    format!("eq.{}", identity.subject()),
                ),
                ("order", "created_at.desc".to_string()),
            ],
        )?;
        tracing::debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url), identity)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn list_assets_for_event(
        &self,
        identity: &Identity,
        event_id: &EventId,
    ) -> Result<Vec<Asset>, GalleryError> {
        let url = self.table_url(
            "assets",
            &[
                ("select", "*".to_string()),
                ("event_id", format!("eq.{event_id}")),
                ("order", "created_at.desc".to_string()),
            ],
        )?;
        tracing::debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url), identity)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn insert_asset(
        &self,
        identity: &Identity,
        event_id: &EventId,
        media_reference: &MediaReference,
    ) -> Result<Asset, GalleryError> {
        let url = self.table_url("assets", &[])?;
        let body = NewAsset {
            event_id,
            user_id: identity.subject(),
            asset_id: media_reference,
        };
        tracing::debug!("POST {}", url);
        let response = self
            .authorized(self.client.post(url), identity)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<Asset> = check_status(response).await?.json().await?;
        rows.into_iter().next().ok_or(GalleryError::EmptyInsert)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::types::{AssetId, SubjectId};

    /// In-memory gallery that records inserted rows.
    #[derive(Default)]
    pub struct FakeGallery {
        pub fail_insert: bool,
        pub rows: Mutex<Vec<Asset>>,
        pub events: Vec<Event>,
        pub insert_calls: AtomicUsize,
        pub list_calls: AtomicUsize,
    }

    impl FakeGallery {
        pub fn failing_inserts() -> Self {
            Self {
                fail_insert: true,
                ..Default::default()
            }
        }

        pub fn inserts(&self) -> usize {
            self.insert_calls.load(Ordering::SeqCst)
        }

        pub fn lists(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn rows(&self) -> Vec<Asset> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GalleryService for FakeGallery {
        async fn list_events_for_identity(
            &self,
            _identity: &Identity,
        ) -> Result<Vec<Event>, GalleryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.events.clone())
        }

        async fn list_assets_for_event(
            &self,
            _identity: &Identity,
            event_id: &EventId,
        ) -> Result<Vec<Asset>, GalleryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows()
                .into_iter()
                .filter(|a| &a.event_id == event_id)
                .collect())
        }

        async fn insert_asset(
            &self,
            identity: &Identity,
            event_id: &EventId,
            media_reference: &MediaReference,
        ) -> Result<Asset, GalleryError> {
            let n = self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert {
                return Err(GalleryError::HttpStatus {
                    status: 500,
                    message: "insert failed".into(),
                });
            }
            let asset = Asset {
                id: AssetId::new(format!("a{}", n + 1)).unwrap(),
                event_id: event_id.clone(),
                user_id: Some(SubjectId::clone(identity.subject())),
                media_reference: media_reference.clone(),
                created_at: None,
            };
            self.rows.lock().unwrap().push(asset.clone());
            Ok(asset)
        }
    }
}
