use crate::ledger::{LedgerStorage, SyncState, TypeState};
use crate::library::{LibraryError, LibraryStore};
use crate::reconcile::{reconcile, PruneMode, SyncDelta, SyncDirections};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use scrobble_api::{ApiError, SimklApi};
use scrobble_config::SyncOptions;
use scrobble_models::{MediaType, WatchSource, WatchedItem};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch the whole remote watched set
    Full,
    /// Fetch only what changed since the last clean run
    Delta,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Delta => f.write_str("delta"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
    Prune,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Push => f.write_str("push"),
            SyncDirection::Pull => f.write_str("pull"),
            SyncDirection::Prune => f.write_str("prune"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: WatchedItem,
    pub direction: SyncDirection,
    pub error: String,
}

/// Outcome of one reconciliation run for one media type
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub media_type: MediaType,
    /// Mode actually used, after any escalation to full
    pub mode: SyncMode,
    pub dry_run: bool,
    pub planned_push: usize,
    pub planned_pull: usize,
    pub planned_prune: usize,
    pub pushed: usize,
    pub pulled: usize,
    pub pruned: usize,
    /// Pulled items the local library does not hold
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
    pub watermark_advanced: bool,
    pub duration: Duration,
}

impl SyncReport {
    fn new(media_type: MediaType, mode: SyncMode, dry_run: bool, delta: &SyncDelta) -> Self {
        Self {
            media_type,
            mode,
            dry_run,
            planned_push: delta.to_push.len(),
            planned_pull: delta.to_pull.len(),
            planned_prune: delta.to_prune.len(),
            pushed: 0,
            pulled: 0,
            pruned: 0,
            skipped: 0,
            failures: Vec::new(),
            cancelled: false,
            watermark_advanced: false,
            duration: Duration::ZERO,
        }
    }

    /// Finished without cancellation or per-item failures
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("reconciliation already in progress for {0}s")]
    ReconciliationInProgress(MediaType),

    #[error("{0}s are not synced")]
    UnsupportedMediaType(MediaType),

    #[error("SIMKL rejected the access token, sign in again")]
    Unauthorized,

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("sync state storage failed: {0}")]
    Storage(String),

    #[error("SIMKL request failed: {0}")]
    Api(ApiError),
}

impl From<ApiError> for SyncError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => SyncError::Unauthorized,
            other => SyncError::Api(other),
        }
    }
}

/// Remote watched set for a run, and how it was obtained
struct RemoteView {
    items: Vec<WatchedItem>,
    mode: SyncMode,
}

/// Two-way watched-state reconciliation between the local library and SIMKL
pub struct SyncEngine {
    api: Arc<dyn SimklApi>,
    library: Arc<dyn LibraryStore>,
    options: SyncOptions,
    directions: SyncDirections,
    storage: Option<LedgerStorage>,
    state: Mutex<SyncState>,
    locks: BTreeMap<MediaType, tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
    dry_run: bool,
}

impl SyncEngine {
    /// Build an engine, loading persisted sync state when `storage` is given
    pub fn new(
        api: Arc<dyn SimklApi>,
        library: Arc<dyn LibraryStore>,
        options: SyncOptions,
        storage: Option<LedgerStorage>,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let state = match &storage {
            Some(storage) => storage
                .load()
                .map_err(|e| SyncError::Storage(e.to_string()))?,
            None => SyncState::default(),
        };
        let locks = MediaType::SYNCABLE
            .into_iter()
            .map(|t| (t, tokio::sync::Mutex::new(())))
            .collect();

        Ok(Self {
            api,
            library,
            directions: SyncDirections::from_options(&options),
            options,
            storage,
            state: Mutex::new(state),
            locks,
            cancel,
            dry_run: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_directions(mut self, directions: SyncDirections) -> Self {
        self.directions = directions;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sync bookkeeping for one media type, as last persisted
    pub fn type_state(&self, media_type: MediaType) -> TypeState {
        self.lock_state().get(media_type)
    }

    /// Media types with at least one enabled direction
    pub fn enabled_media_types(&self) -> Vec<MediaType> {
        MediaType::SYNCABLE
            .into_iter()
            .filter(|t| self.directions.exports(*t) || self.directions.imports(*t))
            .collect()
    }

    /// Run every requested media type concurrently
    pub async fn run_all(
        &self,
        media_types: &[MediaType],
        mode: SyncMode,
    ) -> Vec<Result<SyncReport, SyncError>> {
        join_all(media_types.iter().map(|t| self.run(*t, mode))).await
    }

    #[instrument(skip(self))]
    pub async fn run(&self, media_type: MediaType, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let lock = self
            .locks
            .get(&media_type)
            .ok_or(SyncError::UnsupportedMediaType(media_type))?;
        let _guard = lock
            .try_lock()
            .map_err(|_| SyncError::ReconciliationInProgress(media_type))?;
        let mode = self.effective_mode(mode);

        let started = Instant::now();
        let run_started_at = Utc::now();
        let mut type_state = self.type_state(media_type);

        info!(
            operation = "sync_start",
            media_type = %media_type,
            mode = %mode,
            "Starting sync"
        );

        let remote = self.fetch_remote(media_type, mode, &type_state).await?;
        let local = self.library.get_watched_items(media_type).await?;

        let prune = if self.options.prune_remote {
            PruneMode::Enabled {
                pushed: type_state.pushed.clone(),
            }
        } else {
            PruneMode::Disabled
        };
        let delta = reconcile(&local, &remote.items, &self.directions, prune);
        let mut report = SyncReport::new(media_type, remote.mode, self.dry_run, &delta);

        if self.dry_run {
            info!(
                operation = "sync_dry_run",
                media_type = %media_type,
                to_push = report.planned_push,
                to_pull = report.planned_pull,
                to_prune = report.planned_prune,
                "Dry run, nothing applied"
            );
            report.duration = started.elapsed();
            return Ok(report);
        }

        let mut remote_now = remote.items;
        let applied = self
            .apply(&delta, &mut report, &mut type_state, &mut remote_now)
            .await;

        if applied.is_ok() && report.is_clean() {
            type_state.watermark = Some(run_started_at);
            type_state.set_snapshot(&remote_now);
            report.watermark_advanced = true;
        }
        // The pushed ledger is kept even when the run stops early
        self.persist(media_type, type_state)?;
        applied?;

        report.duration = started.elapsed();
        info!(
            operation = "sync_complete",
            media_type = %media_type,
            mode = %report.mode,
            pushed = report.pushed,
            pulled = report.pulled,
            pruned = report.pruned,
            skipped = report.skipped,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration.as_millis() as u64,
            "Sync finished"
        );
        Ok(report)
    }

    /// Delta requests run in full when delta sync is turned off
    fn effective_mode(&self, requested: SyncMode) -> SyncMode {
        if self.options.delta {
            requested
        } else {
            SyncMode::Full
        }
    }

    async fn fetch_remote(
        &self,
        media_type: MediaType,
        requested: SyncMode,
        type_state: &TypeState,
    ) -> Result<RemoteView, SyncError> {
        let baseline = match (requested, type_state.watermark, type_state.snapshot_items()) {
            (SyncMode::Delta, Some(watermark), Some(snapshot)) if !self.options.prune_remote => {
                Some((watermark, snapshot))
            }
            (SyncMode::Delta, ..) => {
                debug!(media_type = %media_type, "No usable baseline, escalating to full sync");
                None
            }
            (SyncMode::Full, ..) => None,
        };

        let Some((watermark, mut snapshot)) = baseline else {
            let items = self.api.get_watched(media_type, None).await?;
            return Ok(RemoteView {
                items,
                mode: SyncMode::Full,
            });
        };

        let activities = self.api.get_activities().await?;
        if activities
            .last_removal(media_type)
            .is_some_and(|removed| removed > watermark)
        {
            // A date_from fetch cannot see removals
            info!(media_type = %media_type, "Remote removals since last sync, escalating to full sync");
            let items = self.api.get_watched(media_type, None).await?;
            return Ok(RemoteView {
                items,
                mode: SyncMode::Full,
            });
        }
        if activities
            .last_change(media_type)
            .is_some_and(|changed| changed <= watermark)
        {
            debug!(media_type = %media_type, "Remote unchanged since last sync");
            return Ok(RemoteView {
                items: snapshot,
                mode: SyncMode::Delta,
            });
        }

        let changed = self.api.get_watched(media_type, Some(watermark)).await?;
        debug!(media_type = %media_type, changed = changed.len(), "Fetched remote changes");
        merge_into(&mut snapshot, changed);
        Ok(RemoteView {
            items: snapshot,
            mode: SyncMode::Delta,
        })
    }

    async fn apply(
        &self,
        delta: &SyncDelta,
        report: &mut SyncReport,
        type_state: &mut TypeState,
        remote_now: &mut Vec<WatchedItem>,
    ) -> Result<(), SyncError> {
        for item in &delta.to_push {
            if self.check_cancelled(report) {
                return Ok(());
            }
            match self.api.add_to_history(std::slice::from_ref(item)).await {
                Ok(()) => {
                    report.pushed += 1;
                    type_state.record_pushed(item);
                    remote_now.push(item.with_source(WatchSource::Remote));
                }
                Err(ApiError::Unauthorized) => return Err(SyncError::Unauthorized),
                Err(e) => record_failure(report, item, SyncDirection::Push, e.to_string()),
            }
        }

        for item in &delta.to_pull {
            if self.check_cancelled(report) {
                return Ok(());
            }
            match self.library.mark_watched(item).await {
                Ok(true) => report.pulled += 1,
                Ok(false) => {
                    debug!(item = %item.identity.display_title(), "Not in local library, skipping");
                    report.skipped += 1;
                }
                Err(e) => record_failure(report, item, SyncDirection::Pull, e.to_string()),
            }
        }

        for item in &delta.to_prune {
            if self.check_cancelled(report) {
                return Ok(());
            }
            match self.api.remove_from_history(std::slice::from_ref(item)).await {
                Ok(()) => {
                    report.pruned += 1;
                    type_state.forget_pushed(item);
                    remote_now.retain(|r| !r.identity.same_item(&item.identity));
                }
                Err(ApiError::Unauthorized) => return Err(SyncError::Unauthorized),
                Err(e) => record_failure(report, item, SyncDirection::Prune, e.to_string()),
            }
        }
        Ok(())
    }

    fn check_cancelled(&self, report: &mut SyncReport) -> bool {
        if self.cancel.is_cancelled() {
            if !report.cancelled {
                info!(media_type = %report.media_type, "Sync cancelled, stopping before the next item");
            }
            report.cancelled = true;
        }
        report.cancelled
    }

    /// Push one item outside a full run and remember that this tool pushed it
    pub async fn push_item(&self, item: &WatchedItem) -> Result<(), SyncError> {
        let _guard = self.wait_for_type(item.media_type).await?;
        self.api.add_to_history(std::slice::from_ref(item)).await?;
        let mut type_state = self.type_state(item.media_type);
        type_state.record_pushed(item);
        self.persist(item.media_type, type_state)
    }

    /// Remove one item from the remote history outside a full run
    pub async fn retract_item(&self, item: &WatchedItem) -> Result<(), SyncError> {
        let _guard = self.wait_for_type(item.media_type).await?;
        self.api.remove_from_history(std::slice::from_ref(item)).await?;
        let mut type_state = self.type_state(item.media_type);
        type_state.forget_pushed(item);
        self.persist(item.media_type, type_state)
    }

    async fn wait_for_type(
        &self,
        media_type: MediaType,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, SyncError> {
        let lock = self
            .locks
            .get(&media_type)
            .ok_or(SyncError::UnsupportedMediaType(media_type))?;
        Ok(lock.lock().await)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, media_type: MediaType, type_state: TypeState) -> Result<(), SyncError> {
        let mut state = self.lock_state();
        state.set(media_type, type_state);
        if let Some(storage) = &self.storage {
            storage
                .save(&state)
                .map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Latest clean-run time across the given types
    pub fn last_synced(&self, media_types: &[MediaType]) -> Option<DateTime<Utc>> {
        media_types
            .iter()
            .filter_map(|t| self.type_state(*t).watermark)
            .max()
    }

    /// Forget watermarks and snapshots so the next run is a full sync
    pub fn reset_watermarks(&self) -> Result<(), SyncError> {
        let mut state = self.lock_state();
        for type_state in state.types.values_mut() {
            type_state.watermark = None;
            type_state.snapshot = None;
        }
        if let Some(storage) = &self.storage {
            storage
                .save(&state)
                .map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

fn record_failure(report: &mut SyncReport, item: &WatchedItem, direction: SyncDirection, error: String) {
    warn!(
        item = %item.identity.display_title(),
        direction = %direction,
        error = %error,
        "Sync item failed"
    );
    report.failures.push(ItemFailure {
        item: item.clone(),
        direction,
        error,
    });
}

/// Merge remote changes into a stored snapshot, replacing entries for the same item
fn merge_into(snapshot: &mut Vec<WatchedItem>, changed: Vec<WatchedItem>) {
    for item in changed {
        match snapshot
            .iter_mut()
            .find(|s| s.media_type == item.media_type && s.identity.same_item(&item.identity))
        {
            Some(existing) => *existing = item,
            None => snapshot.push(item),
        }
    }
}
