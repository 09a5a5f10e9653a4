use crate::error::ApiError;
use crate::payload::Activities;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scrobble_models::{MediaIdentity, MediaType, Rating, WatchedItem};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrobbleAction {
    Start,
    Pause,
    Stop,
}

impl ScrobbleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrobbleAction::Start => "start",
            ScrobbleAction::Pause => "pause",
            ScrobbleAction::Stop => "stop",
        }
    }

    pub fn endpoint(&self) -> String {
        format!("/scrobble/{}", self.as_str())
    }
}

impl fmt::Display for ScrobbleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed SIMKL operations consumed by the scrobbler, sync engine and
/// context-menu actions
#[async_trait]
pub trait SimklApi: Send + Sync {
    /// Report live playback; `progress` is the percentage watched
    async fn scrobble(
        &self,
        action: ScrobbleAction,
        identity: &MediaIdentity,
        media_type: MediaType,
        progress: f64,
    ) -> Result<(), ApiError>;

    async fn add_to_history(&self, items: &[WatchedItem]) -> Result<(), ApiError>;

    async fn remove_from_history(&self, items: &[WatchedItem]) -> Result<(), ApiError>;

    /// Completed items of one type, optionally only those changed since `date_from`
    async fn get_watched(
        &self,
        media_type: MediaType,
        date_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<WatchedItem>, ApiError>;

    async fn get_activities(&self) -> Result<Activities, ApiError>;

    async fn add_rating(
        &self,
        identity: &MediaIdentity,
        media_type: MediaType,
        rating: Rating,
    ) -> Result<(), ApiError>;

    async fn remove_rating(&self, identity: &MediaIdentity, media_type: MediaType) -> Result<(), ApiError>;
}
