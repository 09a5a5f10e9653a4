//! In-memory SIMKL and library doubles shared by the core tests

use crate::library::{LibraryEntry, LibraryError, LibraryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scrobble_api::{Activities, ApiError, ScrobbleAction, SimklApi};
use scrobble_models::{IdentityKey, MediaIdentity, MediaType, Rating, WatchSource, WatchedItem};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Scrobble {
        action: ScrobbleAction,
        key: Option<IdentityKey>,
        progress: f64,
    },
    AddHistory(usize),
    RemoveHistory(usize),
    GetWatched {
        media_type: MediaType,
        since: Option<DateTime<Utc>>,
    },
    Activities,
    AddRating {
        key: Option<IdentityKey>,
        media_type: MediaType,
        rating: u8,
    },
    RemoveRating {
        key: Option<IdentityKey>,
        media_type: MediaType,
    },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<ApiCall>,
    history: Vec<WatchedItem>,
    activities: Activities,
    failure: Option<ApiError>,
    item_failures: HashMap<IdentityKey, ApiError>,
    watched_delay: Option<Duration>,
}

/// SIMKL account held in memory; records every call it receives
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(items: Vec<WatchedItem>) -> Self {
        let api = Self::new();
        api.state.lock().unwrap().history = items;
        api
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn scrobbles(&self) -> Vec<(ScrobbleAction, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Scrobble { action, progress, .. } => Some((action, progress)),
                _ => None,
            })
            .collect()
    }

    pub fn history(&self) -> Vec<WatchedItem> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Every call fails with `error` until cleared
    pub fn fail_with(&self, error: Option<ApiError>) {
        self.state.lock().unwrap().failure = error;
    }

    /// History writes containing this item fail
    pub fn fail_item(&self, item: &WatchedItem, error: ApiError) {
        if let Some(key) = item.key() {
            self.state.lock().unwrap().item_failures.insert(key, error);
        }
    }

    pub fn set_activities(&self, activities: Activities) {
        self.state.lock().unwrap().activities = activities;
    }

    /// Delay `get_watched` so a run can be observed while in flight
    pub fn delay_watched(&self, delay: Duration) {
        self.state.lock().unwrap().watched_delay = Some(delay);
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match &state.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn item_failure(&self, items: &[WatchedItem]) -> Option<ApiError> {
        let state = self.state.lock().unwrap();
        items
            .iter()
            .filter_map(WatchedItem::key)
            .find_map(|key| state.item_failures.get(&key).cloned())
    }
}

#[async_trait]
impl SimklApi for FakeApi {
    async fn scrobble(
        &self,
        action: ScrobbleAction,
        identity: &MediaIdentity,
        media_type: MediaType,
        progress: f64,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::Scrobble {
            action,
            key: identity.key(media_type),
            progress,
        })
    }

    async fn add_to_history(&self, items: &[WatchedItem]) -> Result<(), ApiError> {
        self.record(ApiCall::AddHistory(items.len()))?;
        if let Some(error) = self.item_failure(items) {
            return Err(error);
        }
        let mut state = self.state.lock().unwrap();
        state
            .history
            .extend(items.iter().map(|i| i.with_source(WatchSource::Remote)));
        Ok(())
    }

    async fn remove_from_history(&self, items: &[WatchedItem]) -> Result<(), ApiError> {
        self.record(ApiCall::RemoveHistory(items.len()))?;
        if let Some(error) = self.item_failure(items) {
            return Err(error);
        }
        let mut state = self.state.lock().unwrap();
        state.history.retain(|h| {
            !items
                .iter()
                .any(|i| i.media_type == h.media_type && i.identity.same_item(&h.identity))
        });
        Ok(())
    }

    async fn get_watched(
        &self,
        media_type: MediaType,
        date_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<WatchedItem>, ApiError> {
        self.record(ApiCall::GetWatched {
            media_type,
            since: date_from,
        })?;
        let delay = self.state.lock().unwrap().watched_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .iter()
            .filter(|h| h.media_type == media_type)
            .filter(|h| date_from.map_or(true, |since| h.watched_at >= since))
            .cloned()
            .collect())
    }

    async fn get_activities(&self) -> Result<Activities, ApiError> {
        self.record(ApiCall::Activities)?;
        Ok(self.state.lock().unwrap().activities.clone())
    }

    async fn add_rating(
        &self,
        identity: &MediaIdentity,
        media_type: MediaType,
        rating: Rating,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::AddRating {
            key: identity.key(media_type),
            media_type,
            rating: rating.value(),
        })
    }

    async fn remove_rating(&self, identity: &MediaIdentity, media_type: MediaType) -> Result<(), ApiError> {
        self.record(ApiCall::RemoveRating {
            key: identity.key(media_type),
            media_type,
        })
    }
}

/// Host library held in memory
#[derive(Default)]
pub struct MemoryLibrary {
    entries: Mutex<Vec<LibraryEntry>>,
    failure: Mutex<Option<LibraryError>>,
}

impl MemoryLibrary {
    pub fn new(entries: Vec<LibraryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            failure: Mutex::new(None),
        }
    }

    pub fn entries(&self) -> Vec<LibraryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn watched_count(&self, media_type: MediaType) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.media_type == media_type && e.is_watched())
            .count()
    }

    pub fn fail_with(&self, error: Option<LibraryError>) {
        *self.failure.lock().unwrap() = error;
    }

    fn check(&self) -> Result<(), LibraryError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn set_watched(&self, item: &WatchedItem, watched_at: Option<DateTime<Utc>>) -> Result<bool, LibraryError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let mut changed = false;
        for entry in entries
            .iter_mut()
            .filter(|e| e.media_type == item.media_type && e.identity.same_item(&item.identity))
        {
            entry.watched_at = watched_at;
            changed = true;
        }
        Ok(changed)
    }
}

#[async_trait]
impl LibraryStore for MemoryLibrary {
    async fn get_watched_items(&self, media_type: MediaType) -> Result<Vec<WatchedItem>, LibraryError> {
        self.check()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.media_type == media_type && e.is_watched())
            .map(LibraryEntry::to_watched_item)
            .collect())
    }

    async fn mark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError> {
        self.set_watched(item, Some(item.watched_at))
    }

    async fn unmark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError> {
        self.set_watched(item, None)
    }

    async fn get_item(&self, media_type: MediaType, dbid: u64) -> Result<LibraryEntry, LibraryError> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.media_type == media_type && e.dbid == dbid)
            .cloned()
            .ok_or(LibraryError::NotFound { media_type, dbid })
    }
}

pub fn library_movie(dbid: u64, imdb: &str, watched: bool) -> LibraryEntry {
    LibraryEntry {
        dbid,
        media_type: MediaType::Movie,
        identity: MediaIdentity::movie(scrobble_models::MediaIds::new().with_imdb(imdb))
            .with_title(format!("Movie {}", dbid), Some(2000)),
        watched_at: watched.then(Utc::now),
    }
}

pub fn library_episode(dbid: u64, tvdb: u32, season: u32, number: u32, watched: bool) -> LibraryEntry {
    LibraryEntry {
        dbid,
        media_type: MediaType::Episode,
        identity: MediaIdentity::episode(scrobble_models::MediaIds::new().with_tvdb(tvdb), season, number)
            .with_title("Show", None),
        watched_at: watched.then(Utc::now),
    }
}

pub fn remote_movie(imdb: &str) -> WatchedItem {
    WatchedItem::new(
        MediaIdentity::movie(scrobble_models::MediaIds::new().with_imdb(imdb)),
        MediaType::Movie,
        Utc::now(),
        WatchSource::Remote,
    )
}
