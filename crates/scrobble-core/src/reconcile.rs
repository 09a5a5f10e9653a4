// Watched-state reconciliation between the local library and the remote history

use scrobble_config::SyncOptions;
use scrobble_models::{IdentityKey, MediaType, WatchedItem};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Which sync directions are enabled for which media types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDirections {
    pub export: BTreeSet<MediaType>,
    pub import: BTreeSet<MediaType>,
}

impl SyncDirections {
    /// Export and import for every syncable type
    pub fn both() -> Self {
        Self {
            export: MediaType::SYNCABLE.into_iter().collect(),
            import: MediaType::SYNCABLE.into_iter().collect(),
        }
    }

    pub fn from_options(options: &SyncOptions) -> Self {
        Self {
            export: MediaType::SYNCABLE
                .into_iter()
                .filter(|t| options.export_enabled(*t))
                .collect(),
            import: MediaType::SYNCABLE
                .into_iter()
                .filter(|t| options.import_enabled(*t))
                .collect(),
        }
    }

    pub fn exports(&self, media_type: MediaType) -> bool {
        self.export.contains(&media_type)
    }

    pub fn imports(&self, media_type: MediaType) -> bool {
        self.import.contains(&media_type)
    }
}

/// Whether remote items this tool pushed earlier may be retracted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PruneMode {
    #[default]
    Disabled,
    /// Identity keys of every item previously pushed by this tool
    Enabled { pushed: BTreeSet<IdentityKey> },
}

/// Work computed by one reconciliation; never persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDelta {
    pub to_push: Vec<WatchedItem>,
    pub to_pull: Vec<WatchedItem>,
    pub to_prune: Vec<WatchedItem>,
}

impl SyncDelta {
    pub fn is_empty(&self) -> bool {
        self.to_push.is_empty() && self.to_pull.is_empty() && self.to_prune.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_push.len() + self.to_pull.len() + self.to_prune.len()
    }
}

/// Set of match keys for one side, built from deduplicated items
struct KeyIndex {
    keys: HashSet<IdentityKey>,
}

impl KeyIndex {
    fn new() -> Self {
        Self { keys: HashSet::new() }
    }

    fn contains(&self, item: &WatchedItem) -> bool {
        item.identity
            .match_keys(item.media_type)
            .iter()
            .any(|key| self.keys.contains(key))
    }

    fn insert(&mut self, item: &WatchedItem) {
        self.keys.extend(item.identity.match_keys(item.media_type));
    }
}

/// Items of `media_type`, with duplicates and unidentifiable items dropped.
/// The first occurrence of an item wins.
fn unique_of_type(items: &[WatchedItem], media_type: MediaType) -> (Vec<&WatchedItem>, KeyIndex) {
    let mut index = KeyIndex::new();
    let mut unique = Vec::new();
    let mut skipped_duplicates = 0;

    for item in items.iter().filter(|i| i.media_type == media_type) {
        if !item.identity.is_identified() {
            continue;
        }
        if index.contains(item) {
            skipped_duplicates += 1;
            continue;
        }
        index.insert(item);
        unique.push(item);
    }

    if skipped_duplicates > 0 {
        debug!(media_type = %media_type, skipped_duplicates, "Collapsed duplicate watched items");
    }
    (unique, index)
}

fn is_pushed(item: &WatchedItem, pushed: &BTreeSet<IdentityKey>) -> bool {
    item.identity
        .match_keys(item.media_type)
        .iter()
        .any(|key| pushed.contains(key))
}

/// Compute what to push, pull and (optionally) prune.
///
/// Items match across sides when any of their external-id keys is equal;
/// episodes must also agree on season and episode number.
pub fn reconcile(
    local: &[WatchedItem],
    remote: &[WatchedItem],
    directions: &SyncDirections,
    prune: PruneMode,
) -> SyncDelta {
    let mut delta = SyncDelta::default();

    for media_type in MediaType::SYNCABLE {
        let (local_items, local_index) = unique_of_type(local, media_type);
        let (remote_items, remote_index) = unique_of_type(remote, media_type);

        if directions.exports(media_type) {
            delta.to_push.extend(
                local_items
                    .iter()
                    .filter(|item| !remote_index.contains(item))
                    .map(|item| (*item).clone()),
            );
        }

        let remote_only: Vec<&WatchedItem> = remote_items
            .into_iter()
            .filter(|item| !local_index.contains(item))
            .collect();

        if let PruneMode::Enabled { pushed } = &prune {
            delta.to_prune.extend(
                remote_only
                    .iter()
                    .filter(|item| is_pushed(item, pushed))
                    .map(|item| (*item).clone()),
            );
        }

        if directions.imports(media_type) {
            // An item about to be retracted is not copied back
            delta.to_pull.extend(
                remote_only
                    .iter()
                    .filter(|item| !delta.to_prune.iter().any(|p| p.identity.same_item(&item.identity)))
                    .map(|item| (*item).clone()),
            );
        }
    }

    debug!(
        to_push = delta.to_push.len(),
        to_pull = delta.to_pull.len(),
        to_prune = delta.to_prune.len(),
        "Reconciled watched sets"
    );
    delta
}
