use crate::exclusion::{ExclusionFilter, ExclusionRule};
use chrono::{DateTime, Utc};
use scrobble_api::{ApiError, ScrobbleAction, SimklApi};
use scrobble_config::ScrobbleConfig;
use scrobble_models::{
    MediaIdentity, MediaType, PlaybackEvent, PlaybackEventKind, WatchSource, WatchedItem,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
    Paused,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Watching => "watching",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Why a playback start was not turned into a session
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScrobbleError {
    #[error("no external id for '{0}', not scrobbling")]
    UnidentifiedMedia(String),

    #[error("'{path}' excluded by {rule}")]
    Excluded { path: String, rule: String },

    #[error("scrobbling {0}s is disabled")]
    MediaTypeDisabled(MediaType),

    #[error("{0} playback cannot be scrobbled")]
    UnsupportedMediaType(MediaType),
}

/// One outbound call made on behalf of a session
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Start { progress: f64 },
    Pause { progress: f64 },
    /// Periodic `scrobble/start` re-send while watching
    Progress { progress: f64 },
    /// `scrobble/stop`; `completes` when SIMKL will mark the item watched
    Stop { progress: f64, completes: bool },
    /// Completion through `/sync/history` for stops below SIMKL's own threshold
    HistoryFallback,
}

impl Emission {
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            Emission::Stop { completes: true, .. } | Emission::HistoryFallback
        )
    }
}

/// A failed emission; the state change it belonged to still happened
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionFailure {
    pub emission: Emission,
    pub error: ApiError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub emissions: Vec<Emission>,
    pub failures: Vec<EmissionFailure>,
}

impl Transition {
    fn unchanged(state: SessionState) -> Self {
        Self {
            from: state,
            to: state,
            emissions: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn completions(&self) -> usize {
        self.emissions.iter().filter(|e| e.is_completion()).count()
    }

    fn absorb(&mut self, other: Transition) {
        self.emissions.extend(other.emissions);
        self.failures.extend(other.failures);
    }
}

/// The item currently playing, owned by the [`Scrobbler`]
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub identity: MediaIdentity,
    pub media_type: MediaType,
    pub source_path: String,
    pub started_at: DateTime<Utc>,
    pub last_progress_percent: f64,
    pub state: SessionState,
    peak_percent: f64,
    last_emission: Instant,
}

impl PlaybackSession {
    fn record(&mut self, percent: Option<f64>) {
        if let Some(percent) = percent {
            let percent = percent.clamp(0.0, 100.0);
            self.last_progress_percent = percent;
            self.peak_percent = self.peak_percent.max(percent);
        }
    }

    fn label(&self) -> String {
        self.identity.display_title()
    }
}

/// Playback state machine: turns host events into SIMKL scrobbles
pub struct Scrobbler {
    api: Arc<dyn SimklApi>,
    config: ScrobbleConfig,
    exclusions: ExclusionFilter,
    session: Option<PlaybackSession>,
}

impl Scrobbler {
    pub fn new(api: Arc<dyn SimklApi>, config: ScrobbleConfig, exclusions: ExclusionFilter) -> Self {
        Self {
            api,
            config,
            exclusions,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub async fn handle_event(&mut self, event: PlaybackEvent) -> Result<Transition, ScrobbleError> {
        debug!(kind = ?event.kind, media_type = %event.media_type, percent = ?event.percent_elapsed, "Playback event");
        match event.kind {
            PlaybackEventKind::Started => self.start(event).await,
            PlaybackEventKind::Paused => Ok(self.pause(event.percent_elapsed).await),
            PlaybackEventKind::Resumed => Ok(self.resume(event.percent_elapsed).await),
            PlaybackEventKind::Progress => Ok(self.progress(event.percent_elapsed).await),
            PlaybackEventKind::Stopped => Ok(self.stop(event.percent_elapsed).await),
        }
    }

    fn check_scrobbleable(&self, event: &PlaybackEvent) -> Result<(), ScrobbleError> {
        if !event.media_type.is_syncable() {
            return Err(ScrobbleError::UnsupportedMediaType(event.media_type));
        }
        if !self.config.is_enabled_for(event.media_type) {
            return Err(ScrobbleError::MediaTypeDisabled(event.media_type));
        }
        if self.exclusions.is_excluded(&event.source_path) {
            let rule = self
                .exclusions
                .matching_rule(&event.source_path)
                .map_or_else(|| "empty path".to_string(), ExclusionRule::to_string);
            return Err(ScrobbleError::Excluded {
                path: event.source_path.clone(),
                rule,
            });
        }
        if !event.identity.is_identified() {
            return Err(ScrobbleError::UnidentifiedMedia(event.identity.display_title()));
        }
        if event.media_type == MediaType::Episode && event.identity.episode.is_none() {
            return Err(ScrobbleError::UnidentifiedMedia(event.identity.display_title()));
        }
        Ok(())
    }

    pub async fn start(&mut self, event: PlaybackEvent) -> Result<Transition, ScrobbleError> {
        let from = self.state();

        let same_item = self.session.as_ref().is_some_and(|session| {
            session.media_type == event.media_type && session.identity.same_item(&event.identity)
        });
        if same_item {
            return Ok(match from {
                SessionState::Paused => self.resume(event.percent_elapsed).await,
                _ => Transition::unchanged(from),
            });
        }

        // Playback of something else replaces whatever was playing
        let mut transition = if self.session.is_some() {
            info!(operation = "binge_switch", "New item started without stop, ending previous session");
            self.finish_session(None).await
        } else {
            Transition::unchanged(from)
        };

        if let Err(err) = self.check_scrobbleable(&event) {
            info!(error = %err, "Playback not scrobbled");
            return Err(err);
        }

        let percent = event.percent_elapsed.unwrap_or(0.0).clamp(0.0, 100.0);
        let session = PlaybackSession {
            identity: event.identity,
            media_type: event.media_type,
            source_path: event.source_path,
            started_at: Utc::now(),
            last_progress_percent: percent,
            state: SessionState::Watching,
            peak_percent: percent,
            last_emission: Instant::now(),
        };
        info!(
            operation = "scrobble_start",
            item = %session.label(),
            media_type = %session.media_type,
            percent = percent,
            "Session started"
        );
        self.session = Some(session);

        let started = self.emit(vec![Emission::Start { progress: percent }]).await;
        transition.absorb(started);
        transition.from = from;
        transition.to = SessionState::Watching;
        Ok(transition)
    }

    pub async fn pause(&mut self, percent: Option<f64>) -> Transition {
        let Some(session) = self.session.as_mut() else {
            return Transition::unchanged(SessionState::Idle);
        };
        if session.state != SessionState::Watching {
            return Transition::unchanged(session.state);
        }
        session.record(percent);
        session.state = SessionState::Paused;
        let progress = session.last_progress_percent;
        debug!(item = %session.label(), percent = progress, "Session paused");

        let mut transition = self.emit(vec![Emission::Pause { progress }]).await;
        transition.from = SessionState::Watching;
        transition.to = SessionState::Paused;
        transition
    }

    pub async fn resume(&mut self, percent: Option<f64>) -> Transition {
        let Some(session) = self.session.as_mut() else {
            return Transition::unchanged(SessionState::Idle);
        };
        if session.state != SessionState::Paused {
            return Transition::unchanged(session.state);
        }
        session.record(percent);
        session.state = SessionState::Watching;
        session.last_emission = Instant::now();
        let progress = session.last_progress_percent;
        debug!(item = %session.label(), percent = progress, "Session resumed");

        let mut transition = self.emit(vec![Emission::Start { progress }]).await;
        transition.from = SessionState::Paused;
        transition.to = SessionState::Watching;
        transition
    }

    pub async fn progress(&mut self, percent: Option<f64>) -> Transition {
        let remote_threshold = f64::from(self.config.remote_complete_threshold);
        let interval = self.config.progress_interval();

        let Some(session) = self.session.as_mut() else {
            return Transition::unchanged(SessionState::Idle);
        };
        let state = session.state;
        if state == SessionState::Completed {
            return Transition::unchanged(state);
        }
        session.record(percent);
        if state != SessionState::Watching {
            return Transition::unchanged(state);
        }

        let progress = session.last_progress_percent;
        if progress >= remote_threshold {
            session.state = SessionState::Completed;
            info!(
                operation = "scrobble_complete",
                item = %session.label(),
                percent = progress,
                "Watched threshold reached"
            );
            let mut transition = self
                .emit(vec![Emission::Stop {
                    progress,
                    completes: true,
                }])
                .await;
            transition.from = SessionState::Watching;
            transition.to = SessionState::Completed;
            return transition;
        }

        if session.last_emission.elapsed() >= interval {
            session.last_emission = Instant::now();
            let mut transition = self.emit(vec![Emission::Progress { progress }]).await;
            transition.from = state;
            transition.to = state;
            return transition;
        }

        Transition::unchanged(state)
    }

    pub async fn stop(&mut self, percent: Option<f64>) -> Transition {
        self.finish_session(percent).await
    }

    /// End the active session, if any, the way a stop would
    pub async fn shutdown(&mut self) -> Transition {
        self.finish_session(None).await
    }

    async fn finish_session(&mut self, percent: Option<f64>) -> Transition {
        let watched_threshold = f64::from(self.config.watched_threshold);
        let remote_threshold = f64::from(self.config.remote_complete_threshold);

        let Some(session) = self.session.as_mut() else {
            return Transition::unchanged(SessionState::Idle);
        };
        let from = session.state;
        if from == SessionState::Completed {
            debug!(item = %session.label(), "Stop after completion, nothing to send");
            self.session = None;
            let mut transition = Transition::unchanged(from);
            transition.to = SessionState::Idle;
            return transition;
        }

        session.record(percent);
        let effective = session.peak_percent;
        let mut emissions = vec![Emission::Stop {
            progress: effective,
            completes: effective >= remote_threshold,
        }];
        if effective >= watched_threshold && effective < remote_threshold {
            emissions.push(Emission::HistoryFallback);
        }
        info!(
            operation = "scrobble_stop",
            item = %session.label(),
            percent = effective,
            completed = emissions.iter().any(Emission::is_completion),
            "Session stopped"
        );

        let mut transition = self.emit(emissions).await;
        self.session = None;
        transition.from = from;
        transition.to = SessionState::Idle;
        transition
    }

    /// Send emissions for the current session in order; failures are recorded
    /// and do not stop the remaining emissions.
    async fn emit(&self, emissions: Vec<Emission>) -> Transition {
        let mut transition = Transition::unchanged(self.state());
        let Some(session) = self.session.as_ref() else {
            return transition;
        };

        for emission in emissions {
            let result = match &emission {
                Emission::Start { progress } | Emission::Progress { progress } => {
                    self.api
                        .scrobble(ScrobbleAction::Start, &session.identity, session.media_type, *progress)
                        .await
                }
                Emission::Pause { progress } => {
                    self.api
                        .scrobble(ScrobbleAction::Pause, &session.identity, session.media_type, *progress)
                        .await
                }
                Emission::Stop { progress, .. } => {
                    self.api
                        .scrobble(ScrobbleAction::Stop, &session.identity, session.media_type, *progress)
                        .await
                }
                Emission::HistoryFallback => {
                    let item = WatchedItem::new(
                        session.identity.clone(),
                        session.media_type,
                        Utc::now(),
                        WatchSource::Local,
                    );
                    self.api.add_to_history(&[item]).await
                }
            };

            if let Err(error) = result {
                warn!(
                    item = %session.label(),
                    emission = ?emission,
                    error = %error,
                    "Scrobble emission failed"
                );
                transition.failures.push(EmissionFailure {
                    emission: emission.clone(),
                    error,
                });
            }
            transition.emissions.push(emission);
        }
        transition
    }
}
