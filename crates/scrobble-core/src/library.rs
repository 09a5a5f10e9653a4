use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scrobble_models::{MediaIdentity, MediaType, WatchSource, WatchedItem};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// An item in the host media library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Host database id, as passed by context-menu callers
    pub dbid: u64,
    pub media_type: MediaType,
    pub identity: MediaIdentity,
    /// When it was last watched; `None` while unwatched
    #[serde(default)]
    pub watched_at: Option<DateTime<Utc>>,
}

impl LibraryEntry {
    pub fn is_watched(&self) -> bool {
        self.watched_at.is_some()
    }

    /// The watched record for this entry, stamped `now` if it is unwatched
    pub fn to_watched_item(&self) -> WatchedItem {
        WatchedItem::new(
            self.identity.clone(),
            self.media_type,
            self.watched_at.unwrap_or_else(Utc::now),
            WatchSource::Local,
        )
    }

    fn is(&self, item: &WatchedItem) -> bool {
        self.media_type == item.media_type && self.identity.same_item(&item.identity)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LibraryError {
    #[error("no {media_type} with id {dbid} in the library")]
    NotFound { media_type: MediaType, dbid: u64 },

    #[error("library storage failed: {0}")]
    Storage(String),
}

/// Read/write access to the host's watched state
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn get_watched_items(&self, media_type: MediaType) -> Result<Vec<WatchedItem>, LibraryError>;

    /// Mark the library's copy of `item` watched. `Ok(false)` when the
    /// library does not hold the item.
    async fn mark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError>;

    /// Mark the library's copy of `item` unwatched. `Ok(false)` when the
    /// library does not hold the item.
    async fn unmark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError>;

    async fn get_item(&self, media_type: MediaType, dbid: u64) -> Result<LibraryEntry, LibraryError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    items: Vec<LibraryEntry>,
}

/// Library kept in a JSON file, for hosts without a library of their own
pub struct FileLibrary {
    path: PathBuf,
    entries: Mutex<Vec<LibraryEntry>>,
}

impl FileLibrary {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: LibraryFile = serde_json::from_str(&content)?;
            file.items
        } else {
            Vec::new()
        };
        debug!(path = ?path, items = entries.len(), "Opened library");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Add or replace an entry by `dbid` and media type
    pub async fn upsert(&self, entry: LibraryEntry) -> Result<(), LibraryError> {
        let mut entries = self.entries.lock().await;
        match entries
            .iter_mut()
            .find(|e| e.dbid == entry.dbid && e.media_type == entry.media_type)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &[LibraryEntry]) -> Result<(), LibraryError> {
        let storage = |e: &dyn std::fmt::Display| LibraryError::Storage(e.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage(&e))?;
        }
        let file = LibraryFile {
            items: entries.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|e| storage(&e))?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content).map_err(|e| storage(&e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| storage(&e))?;
        Ok(())
    }

    async fn set_watched(&self, item: &WatchedItem, watched_at: Option<DateTime<Utc>>) -> Result<bool, LibraryError> {
        let mut entries = self.entries.lock().await;
        let mut changed = false;
        for entry in entries.iter_mut().filter(|e| e.is(item)) {
            entry.watched_at = watched_at;
            changed = true;
        }
        if changed {
            self.persist(&entries)?;
        }
        Ok(changed)
    }
}

#[async_trait]
impl LibraryStore for FileLibrary {
    async fn get_watched_items(&self, media_type: MediaType) -> Result<Vec<WatchedItem>, LibraryError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| e.media_type == media_type && e.is_watched())
            .map(LibraryEntry::to_watched_item)
            .collect())
    }

    async fn mark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError> {
        self.set_watched(item, Some(item.watched_at)).await
    }

    async fn unmark_watched(&self, item: &WatchedItem) -> Result<bool, LibraryError> {
        self.set_watched(item, None).await
    }

    async fn get_item(&self, media_type: MediaType, dbid: u64) -> Result<LibraryEntry, LibraryError> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .find(|e| e.media_type == media_type && e.dbid == dbid)
            .cloned()
            .ok_or(LibraryError::NotFound { media_type, dbid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrobble_models::MediaIds;

    fn entry(dbid: u64, imdb: &str, watched: bool) -> LibraryEntry {
        LibraryEntry {
            dbid,
            media_type: MediaType::Movie,
            identity: MediaIdentity::movie(MediaIds::new().with_imdb(imdb)),
            watched_at: watched.then(Utc::now),
        }
    }

    #[tokio::test]
    async fn test_mark_and_unmark_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        let library = FileLibrary::open(&path).unwrap();
        library.upsert(entry(1, "tt0000001", false)).await.unwrap();
        library.upsert(entry(2, "tt0000002", true)).await.unwrap();

        let watched = library.get_watched_items(MediaType::Movie).await.unwrap();
        assert_eq!(watched.len(), 1);

        let item = entry(1, "tt0000001", true).to_watched_item();
        assert!(library.mark_watched(&item).await.unwrap());

        let reopened = FileLibrary::open(&path).unwrap();
        assert_eq!(reopened.get_watched_items(MediaType::Movie).await.unwrap().len(), 2);
        assert!(reopened.unmark_watched(&item).await.unwrap());
        assert!(!reopened.get_item(MediaType::Movie, 1).await.unwrap().is_watched());
    }

    #[tokio::test]
    async fn test_unknown_items() {
        let dir = tempfile::tempdir().unwrap();
        let library = FileLibrary::open(dir.path().join("library.json")).unwrap();
        let item = entry(9, "tt0000009", true).to_watched_item();
        assert!(!library.mark_watched(&item).await.unwrap());
        assert_eq!(
            library.get_item(MediaType::Movie, 9).await,
            Err(LibraryError::NotFound {
                media_type: MediaType::Movie,
                dbid: 9
            })
        );
    }
}
