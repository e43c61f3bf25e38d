use std::sync::Arc;

use thiserror::Error;

use super::{Invalidate, QueryCache, QueryKey};
use crate::auth::SessionBootstrap;
use crate::gallery::{Asset, Event, GalleryError, GalleryService};
use crate::types::EventId;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No identity available for this query")]
    NoIdentity,

    #[error(transparent)]
    Gallery(Arc<GalleryError>),
}

impl From<Arc<GalleryError>> for QueryError {
    fn from(e: Arc<GalleryError>) -> Self {
        QueryError::Gallery(e)
    }
}

/// Cached gallery reads for the signed-in identity.
///
/// Reads wait for session bootstrap; a device without an identity gets
/// [`QueryError::NoIdentity`] rather than an anonymous request.
pub struct GalleryQueries {
    gallery: Arc<dyn GalleryService>,
    bootstrap: Arc<SessionBootstrap>,
    events: QueryCache<Vec<Event>, GalleryError>,
    assets: QueryCache<Vec<Asset>, GalleryError>,
}

impl std::fmt::Debug for GalleryQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryQueries")
            .field("events", &self.events)
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

impl GalleryQueries {
    pub fn new(gallery: Arc<dyn GalleryService>, bootstrap: Arc<SessionBootstrap>) -> Self {
        Self {
            gallery,
            bootstrap,
            events: QueryCache::new(),
            assets: QueryCache::new(),
        }
    }

    /// Events the current identity belongs to.
    pub async fn events(&self) -> Result<Vec<Event>, QueryError> {
        let identity = self
            .bootstrap
            .ensure_identity()
            .await
            .ok_or(QueryError::NoIdentity)?;
        let gallery = Arc::clone(&self.gallery);
        let events = self
            .events
            .get(QueryKey::EventsList, move || async move {
                gallery.list_events_for_identity(&identity).await
            })
            .await?;
        Ok(events)
    }

    /// Assets registered against `event_id`, possibly stale after a write.
    pub async fn event_assets(&self, event_id: &EventId) -> Result<Vec<Asset>, QueryError> {
        let identity = self
            .bootstrap
            .ensure_identity()
            .await
            .ok_or(QueryError::NoIdentity)?;
        let gallery = Arc::clone(&self.gallery);
        let id = event_id.clone();
        let assets = self
            .assets
            .get(QueryKey::EventAssets(event_id.clone()), move || async move {
                gallery.list_assets_for_event(&identity, &id).await
            })
            .await?;
        Ok(assets)
    }

    /// Whether the cached read behind `key` is fresh. `None` when never read.
    pub fn is_fresh(&self, key: &QueryKey) -> Option<bool> {
        match key {
            QueryKey::EventsList => self.events.peek(key).map(|s| s.fresh),
            QueryKey::EventAssets(_) => self.assets.peek(key).map(|s| s.fresh),
        }
    }

    pub fn clear(&self) {
        self.events.clear();
        self.assets.clear();
    }
}

impl Invalidate for GalleryQueries {
    fn invalidate(&self, key: &QueryKey) -> bool {
        match key {
            QueryKey::EventsList => self.events.invalidate(key),
            QueryKey::EventAssets(_) => self.assets.invalidate(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::bootstrap::testing::FakeIdentity;
    use crate::gallery::testing::FakeGallery;
    use crate::types::MediaReference;

    fn queries(gallery: Arc<FakeGallery>, identity: FakeIdentity) -> GalleryQueries {
        GalleryQueries::new(gallery, Arc::new(SessionBootstrap::new(Arc::new(identity))))
    }

    async fn settled(queries: &GalleryQueries, key: &QueryKey) {
        for _ in 0..100 {
            if queries.is_fresh(key) == Some(true) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{key} never became fresh");
    }

    #[tokio::test]
    async fn test_event_assets_cached_until_invalidated() {
        let gallery = Arc::new(FakeGallery::default());
        let queries = queries(gallery.clone(), FakeIdentity::fresh_device("u1"));
        let e1 = EventId::new("e1").unwrap();
        let key = QueryKey::EventAssets(e1.clone());

        assert!(queries.event_assets(&e1).await.unwrap().is_empty());
        assert!(queries.event_assets(&e1).await.unwrap().is_empty());
        assert_eq!(gallery.lists(), 1);

        let identity = crate::auth::Identity::new(
            crate::types::SubjectId::new("u1").unwrap(),
            "token-u1",
        );
        gallery
            .insert_asset(&identity, &e1, &MediaReference::new("m1").unwrap())
            .await
            .unwrap();
        assert!(queries.invalidate(&key));
        assert_eq!(queries.is_fresh(&key), Some(false));

        // Stale read first, then the background refetch picks up the new row.
        assert!(queries.event_assets(&e1).await.unwrap().is_empty());
        settled(&queries, &key).await;
        let assets = queries.event_assets(&e1).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].media_reference.as_str(), "m1");
        assert_eq!(gallery.lists(), 2);
    }

    #[tokio::test]
    async fn test_events_and_assets_keys_are_separate() {
        let gallery = Arc::new(FakeGallery::default());
        let queries = queries(gallery.clone(), FakeIdentity::fresh_device("u1"));
        let e1 = EventId::new("e1").unwrap();
        queries.events().await.unwrap();
        queries.event_assets(&e1).await.unwrap();

        queries.invalidate(&QueryKey::EventAssets(e1));
        assert_eq!(queries.is_fresh(&QueryKey::EventsList), Some(true));
    }

    #[tokio::test]
    async fn test_no_identity_skips_fetch() {
        let gallery = Arc::new(FakeGallery::default());
        let queries = queries(gallery.clone(), FakeIdentity::default());
        let err = queries.events().await.unwrap_err();
        assert!(matches!(err, QueryError::NoIdentity));
        assert_eq!(gallery.lists(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_before_first_read() {
        let queries = queries(
            Arc::new(FakeGallery::default()),
            FakeIdentity::fresh_device("u1"),
        );
        let key = QueryKey::EventAssets(EventId::new("e1").unwrap());
        assert!(!queries.invalidate(&key));
        assert_eq!(queries.is_fresh(&key), None);
    }
}
