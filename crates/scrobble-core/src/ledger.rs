use anyhow::Result;
use bincode::{deserialize, serialize};
use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use scrobble_models::{
    EpisodeNumber, IdentityKey, MediaIdentity, MediaIds, MediaType, WatchSource, WatchedItem,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Remote watched item in a fixed field layout.
///
/// The model types skip empty fields when serializing, which a positional
/// format like bincode cannot read back, so snapshots go through this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub media_type: MediaType,
    pub imdb: Option<String>,
    pub tmdb: Option<u32>,
    pub tvdb: Option<u32>,
    pub simkl: Option<u64>,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub episode: Option<EpisodeNumber>,
    pub watched_at: DateTime<Utc>,
}

impl From<&WatchedItem> for StoredItem {
    fn from(item: &WatchedItem) -> Self {
        let ids = &item.identity.ids;
        Self {
            media_type: item.media_type,
            imdb: ids.imdb.clone(),
            tmdb: ids.tmdb,
            tvdb: ids.tvdb,
            simkl: ids.simkl,
            title: item.identity.title.clone(),
            year: item.identity.year,
            episode: item.identity.episode,
            watched_at: item.watched_at,
        }
    }
}

impl StoredItem {
    pub fn to_watched_item(&self) -> WatchedItem {
        let identity = MediaIdentity {
            ids: MediaIds {
                imdb: self.imdb.clone(),
                tmdb: self.tmdb,
                tvdb: self.tvdb,
                simkl: self.simkl,
            },
            title: self.title.clone(),
            year: self.year,
            episode: self.episode,
        };
        WatchedItem::new(identity, self.media_type, self.watched_at, WatchSource::Remote)
    }
}

/// Sync bookkeeping for one media type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeState {
    /// Start time of the last run that finished cleanly
    pub watermark: Option<DateTime<Utc>>,
    /// Items this tool added to the remote history
    pub pushed: BTreeSet<IdentityKey>,
    /// Remote watched set as of the watermark
    pub snapshot: Option<Vec<StoredItem>>,
}

impl TypeState {
    /// Whether any key of `item` was pushed by this tool
    pub fn was_pushed(&self, item: &WatchedItem) -> bool {
        item.identity
            .match_keys(item.media_type)
            .iter()
            .any(|key| self.pushed.contains(key))
    }

    pub fn record_pushed(&mut self, item: &WatchedItem) {
        if let Some(key) = item.key() {
            self.pushed.insert(key);
        }
    }

    pub fn forget_pushed(&mut self, item: &WatchedItem) {
        for key in item.identity.match_keys(item.media_type) {
            self.pushed.remove(&key);
        }
    }

    pub fn snapshot_items(&self) -> Option<Vec<WatchedItem>> {
        self.snapshot
            .as_ref()
            .map(|items| items.iter().map(StoredItem::to_watched_item).collect())
    }

    pub fn set_snapshot(&mut self, items: &[WatchedItem]) {
        self.snapshot = Some(items.iter().map(StoredItem::from).collect());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub types: BTreeMap<MediaType, TypeState>,
}

impl SyncState {
    pub fn get(&self, media_type: MediaType) -> TypeState {
        self.types.get(&media_type).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, media_type: MediaType, state: TypeState) {
        self.types.insert(media_type, state);
    }
}

/// Sync state on disk: bincode, gzip-compressed, replaced atomically
pub struct LedgerStorage {
    path: PathBuf,
}

impl LedgerStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SyncState> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No sync state yet, starting empty");
            return Ok(SyncState::default());
        }

        let data = std::fs::read(&self.path)?;
        let mut decoder = GzDecoder::new(&data[..]);
        let mut decompressed = Vec::new();
        let decoded = decoder
            .read_to_end(&mut decompressed)
            .map_err(anyhow::Error::from)
            .and_then(|_| deserialize::<SyncState>(&decompressed).map_err(anyhow::Error::from));

        match decoded {
            Ok(state) => {
                debug!(path = ?self.path, types = state.types.len(), "Loaded sync state");
                Ok(state)
            }
            Err(e) => {
                // Keep the unreadable file around and start over
                let backup_path = self.path.with_extension("bin.bak");
                if let Err(backup_err) = std::fs::copy(&self.path, &backup_path) {
                    warn!(
                        "Failed to back up incompatible sync state: {}. Starting with empty state.",
                        backup_err
                    );
                } else {
                    info!(
                        "Sync state incompatible (error: {}). Backed up to {:?} and starting with empty state.",
                        e, backup_path
                    );
                }
                Ok(SyncState::default())
            }
        }
    }

    pub fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serialize(state)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.path)?;
        debug!(path = ?self.path, "Saved sync state");
        Ok(())
    }

    /// Remove the state file; the next sync runs in full
    pub fn clear(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn movie(imdb: &str) -> WatchedItem {
        WatchedItem::new(
            MediaIdentity::movie(MediaIds::new().with_imdb(imdb)).with_title("A Movie", Some(2001)),
            MediaType::Movie,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            WatchSource::Remote,
        )
    }

    #[test]
    fn test_save_and_load_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LedgerStorage::new(dir.path().join("data").join("sync_state.bin"));

        let mut type_state = TypeState {
            watermark: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ..TypeState::default()
        };
        type_state.record_pushed(&movie("tt0000001"));
        type_state.set_snapshot(&[movie("tt0000001"), movie("tt0000002")]);

        let mut state = SyncState::default();
        state.set(MediaType::Movie, type_state.clone());
        storage.save(&state).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.get(MediaType::Movie), type_state);
        assert_eq!(loaded.get(MediaType::Episode), TypeState::default());

        let snapshot = loaded.get(MediaType::Movie).snapshot_items().unwrap();
        assert_eq!(snapshot[1], movie("tt0000002"));
    }

    #[test]
    fn test_incompatible_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.bin");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let storage = LedgerStorage::new(&path);
        let state = storage.load().unwrap();
        assert!(state.types.is_empty());
        assert!(dir.path().join("sync_state.bin.bak").exists());
    }

    #[test]
    fn test_pushed_ledger_matches_any_id() {
        let mut state = TypeState::default();
        state.record_pushed(&movie("tt0000001"));

        let mut remote = movie("tt0000001");
        remote.identity.ids.tmdb = Some(42);
        assert!(state.was_pushed(&remote));

        state.forget_pushed(&remote);
        assert!(!state.was_pushed(&movie("tt0000001")));
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LedgerStorage::new(dir.path().join("sync_state.bin"));
        assert!(!storage.clear().unwrap());
        storage.save(&SyncState::default()).unwrap();
        assert!(storage.clear().unwrap());
        assert!(!storage.path().exists());
    }
}
