use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssetId, EventId, MediaReference, SubjectId};

/// A shared gallery. Fields beyond these are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A registered photo: links an event, its contributor and the uploaded media.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub event_id: EventId,
    /// Contributor. Rows written before identities existed may lack it.
    #[serde(default)]
    pub user_id: Option<SubjectId>,
    #[serde(rename = "asset_id")]
    pub media_reference: MediaReference,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for the `assets` table.
#[derive(Debug, Serialize)]
pub(crate) struct NewAsset<'a> {
    pub event_id: &'a EventId,
    pub user_id: &'a SubjectId,
    pub asset_id: &'a MediaReference,
}
