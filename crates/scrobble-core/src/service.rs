use crate::scrobbler::{ScrobbleError, Scrobbler, Transition};
use crate::sync::{SyncEngine, SyncError, SyncMode, SyncReport};
use scrobble_models::{MediaType, PlaybackEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    Startup,
    Scheduled,
    LibraryUpdate,
    Manual,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncReason::Startup => "startup",
            SyncReason::Scheduled => "scheduled",
            SyncReason::LibraryUpdate => "library_update",
            SyncReason::Manual => "manual",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTrigger {
    pub reason: SyncReason,
    /// Types to reconcile; empty means every enabled type
    pub media_types: Vec<MediaType>,
    pub mode: SyncMode,
}

impl SyncTrigger {
    pub fn all(reason: SyncReason, mode: SyncMode) -> Self {
        Self {
            reason,
            media_types: Vec::new(),
            mode,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Playback(PlaybackEvent),
    Sync(SyncTrigger),
    Shutdown,
}

/// What the service did, for whoever is listening
#[derive(Debug, Clone)]
pub enum ServiceNotice {
    Playback(Transition),
    PlaybackSkipped(ScrobbleError),
    Sync {
        reason: SyncReason,
        media_type: MediaType,
        result: Result<SyncReport, SyncError>,
    },
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("scrobble service has stopped")]
pub struct ServiceStopped;

/// Enqueues work for a running [`ScrobbleService`]
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl ServiceHandle {
    /// The single entry point for host playback notifications
    pub fn handle_event(&self, event: PlaybackEvent) -> Result<(), ServiceStopped> {
        self.send(ServiceEvent::Playback(event))
    }

    pub fn trigger_sync(&self, trigger: SyncTrigger) -> Result<(), ServiceStopped> {
        self.send(ServiceEvent::Sync(trigger))
    }

    pub fn shutdown(&self) -> Result<(), ServiceStopped> {
        self.send(ServiceEvent::Shutdown)
    }

    fn send(&self, event: ServiceEvent) -> Result<(), ServiceStopped> {
        self.tx.send(event).map_err(|_| ServiceStopped)
    }
}

/// Single consumer of playback and sync events.
///
/// Playback events are handled one at a time in arrival order. Syncs run on
/// spawned workers so reconciliation never holds up scrobbling.
pub struct ScrobbleService {
    scrobbler: Scrobbler,
    engine: Arc<SyncEngine>,
    events: mpsc::UnboundedReceiver<ServiceEvent>,
    notices: broadcast::Sender<ServiceNotice>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl ScrobbleService {
    pub fn new(scrobbler: Scrobbler, engine: Arc<SyncEngine>) -> (Self, ServiceHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let cancel = engine.cancel_token();
        let service = Self {
            scrobbler,
            engine,
            events,
            notices,
            cancel,
            workers: JoinSet::new(),
        };
        (service, ServiceHandle { tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceNotice> {
        self.notices.subscribe()
    }

    /// Process events until shutdown or until every handle is dropped.
    /// Returns the transition that ended the active session, if any.
    pub async fn run(mut self) -> Transition {
        info!(operation = "service_start", "Scrobble service started");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(ServiceEvent::Playback(event)) => self.handle_playback(event).await,
                    Some(ServiceEvent::Sync(trigger)) => self.spawn_sync(trigger),
                    Some(ServiceEvent::Shutdown) | None => break,
                },
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Sync worker failed");
                    }
                }
            }
        }
        self.shutdown().await
    }

    async fn handle_playback(&mut self, event: PlaybackEvent) {
        let notice = match self.scrobbler.handle_event(event).await {
            Ok(transition) => {
                if transition.from != transition.to {
                    debug!(from = %transition.from, to = %transition.to, "Session transition");
                }
                ServiceNotice::Playback(transition)
            }
            Err(skipped) => ServiceNotice::PlaybackSkipped(skipped),
        };
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn spawn_sync(&mut self, trigger: SyncTrigger) {
        if trigger.reason == SyncReason::LibraryUpdate && !self.engine.options().sync_on_library_update {
            debug!("Library updated, sync on library update is off");
            return;
        }

        let enabled = self.engine.enabled_media_types();
        let media_types: Vec<MediaType> = if trigger.media_types.is_empty() {
            enabled
        } else {
            trigger
                .media_types
                .iter()
                .copied()
                .filter(|t| enabled.contains(t))
                .collect()
        };

        info!(
            operation = "sync_trigger",
            reason = %trigger.reason,
            mode = %trigger.mode,
            media_types = ?media_types,
            "Sync requested"
        );

        for media_type in media_types {
            let engine = self.engine.clone();
            let notices = self.notices.clone();
            let reason = trigger.reason;
            let mode = trigger.mode;
            self.workers.spawn(async move {
                let result = engine.run(media_type, mode).await;
                match &result {
                    Err(SyncError::ReconciliationInProgress(t)) => {
                        info!(media_type = %t, reason = %reason, "Sync already running, trigger dropped");
                    }
                    Err(e) => warn!(media_type = %media_type, error = %e, "Sync failed"),
                    Ok(_) => {}
                }
                let _ = notices.send(ServiceNotice::Sync {
                    reason,
                    media_type,
                    result,
                });
            });
        }
    }

    async fn shutdown(mut self) -> Transition {
        info!(operation = "service_shutdown", workers = self.workers.len(), "Shutting down");
        self.cancel.cancel();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Sync worker failed during shutdown");
            }
        }
        let transition = self.scrobbler.shutdown().await;
        let _ = self.notices.send(ServiceNotice::Playback(transition.clone()));
        info!(operation = "service_stopped", "Scrobble service stopped");
        transition
    }
}

/// Enqueues the startup sync and periodic delta syncs
pub struct Scheduler {
    handle: ServiceHandle,
    interval: Option<Duration>,
    sync_on_startup: bool,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        handle: ServiceHandle,
        interval: Option<Duration>,
        sync_on_startup: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            handle,
            interval,
            sync_on_startup,
            cancel,
        }
    }

    pub async fn run(self) {
        if self.sync_on_startup {
            info!(operation = "scheduler_startup", "Queueing startup sync");
            if self
                .handle
                .trigger_sync(SyncTrigger::all(SyncReason::Startup, SyncMode::Full))
                .is_err()
            {
                return;
            }
        }

        let Some(period) = self.interval else {
            debug!("Scheduled sync is off");
            return;
        };
        info!(
            operation = "scheduler_started",
            interval_secs = period.as_secs(),
            "Scheduled sync enabled"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let trigger = SyncTrigger::all(SyncReason::Scheduled, SyncMode::Delta);
                    if self.handle.trigger_sync(trigger).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Scheduler stopped");
    }
}
