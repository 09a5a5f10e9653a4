use crate::identity::{IdentityKey, MediaIdentity};
use crate::media::MediaType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a sync a watched item was read from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WatchSource {
    Local,
    Remote,
}

/// One record of the local library's watched set or the remote account's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedItem {
    pub identity: MediaIdentity,
    pub media_type: MediaType,
    pub watched_at: DateTime<Utc>,
    pub source: WatchSource,
}

impl WatchedItem {
    pub fn new(
        identity: MediaIdentity,
        media_type: MediaType,
        watched_at: DateTime<Utc>,
        source: WatchSource,
    ) -> Self {
        Self {
            identity,
            media_type,
            watched_at,
            source,
        }
    }

    pub fn key(&self) -> Option<IdentityKey> {
        self.identity.key(self.media_type)
    }

    /// Copy of this item attributed to the other side of the sync
    pub fn with_source(&self, source: WatchSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }
}
