use crate::library::{LibraryEntry, LibraryError, LibraryStore};
use crate::sync::{SyncEngine, SyncError};
use chrono::Utc;
use scrobble_api::{ApiError, SimklApi};
use scrobble_models::{MediaType, Rating, WatchSource, WatchedItem};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    ToggleWatched,
    Rate,
    Sync,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ToggleWatched => "togglewatched",
            ActionKind::Rate => "rate",
            ActionKind::Sync => "sync",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "togglewatched" => Ok(ActionKind::ToggleWatched),
            "rate" => Ok(ActionKind::Rate),
            "sync" => Ok(ActionKind::Sync),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

/// A context-menu request against one library item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuAction {
    pub kind: ActionKind,
    pub media_type: MediaType,
    pub dbid: u64,
}

impl MenuAction {
    pub fn parse(action: &str, media_type: &str, dbid: u64) -> Result<Self, ActionError> {
        let kind: ActionKind = action.parse()?;
        let media_type = MediaType::from_str(media_type)
            .map_err(|_| ActionError::UnknownMediaType(media_type.to_string()))?;

        let supported = match kind {
            ActionKind::ToggleWatched | ActionKind::Sync => media_type.is_syncable(),
            ActionKind::Rate => media_type != MediaType::Season,
        };
        if !supported {
            return Err(ActionError::Unsupported { kind, media_type });
        }
        Ok(Self {
            kind,
            media_type,
            dbid,
        })
    }
}

/// What to do with the item's rating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingChoice {
    Set(Rating),
    Remove,
}

/// Result of an action, with the summary shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: String,
    /// Whether anything was changed locally or remotely
    pub changed: bool,
}

impl ActionOutcome {
    fn changed(message: String) -> Self {
        Self {
            message,
            changed: true,
        }
    }

    fn unchanged(message: String) -> Self {
        Self {
            message,
            changed: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("unknown action '{0}', expected togglewatched, rate or sync")]
    UnknownAction(String),

    #[error("unknown media type '{0}'")]
    UnknownMediaType(String),

    #[error("{kind} is not supported for {media_type}s")]
    Unsupported { kind: ActionKind, media_type: MediaType },

    #[error("no external id for '{0}'")]
    Unidentified(String),

    #[error("a rating is required")]
    RatingRequired,

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Carries out context-menu actions against the library and SIMKL
pub struct ActionRunner {
    api: Arc<dyn SimklApi>,
    library: Arc<dyn LibraryStore>,
    engine: Arc<SyncEngine>,
}

impl ActionRunner {
    pub fn new(api: Arc<dyn SimklApi>, library: Arc<dyn LibraryStore>, engine: Arc<SyncEngine>) -> Self {
        Self { api, library, engine }
    }

    /// Look up the item an action targets
    pub async fn lookup(&self, action: &MenuAction) -> Result<LibraryEntry, ActionError> {
        let entry = self.library.get_item(action.media_type, action.dbid).await?;
        if !entry.identity.is_identified() {
            return Err(ActionError::Unidentified(entry.identity.display_title()));
        }
        Ok(entry)
    }

    pub async fn run(
        &self,
        action: &MenuAction,
        rating: Option<RatingChoice>,
    ) -> Result<ActionOutcome, ActionError> {
        let entry = self.lookup(action).await?;
        info!(action = %action.kind, media_type = %action.media_type, dbid = action.dbid, "Running menu action");

        match action.kind {
            ActionKind::ToggleWatched => self.toggle_watched(&entry).await,
            ActionKind::Rate => {
                let choice = rating.ok_or(ActionError::RatingRequired)?;
                self.rate(&entry, choice).await
            }
            ActionKind::Sync => self.sync_item(&entry).await,
        }
    }

    async fn toggle_watched(&self, entry: &LibraryEntry) -> Result<ActionOutcome, ActionError> {
        let title = entry.identity.display_title();
        if entry.is_watched() {
            let item = entry.to_watched_item();
            self.engine.retract_item(&item).await?;
            self.library.unmark_watched(&item).await?;
            Ok(ActionOutcome::changed(format!("Marked as unwatched: {}", title)))
        } else {
            let item = WatchedItem::new(
                entry.identity.clone(),
                entry.media_type,
                Utc::now(),
                WatchSource::Local,
            );
            self.engine.push_item(&item).await?;
            self.library.mark_watched(&item).await?;
            Ok(ActionOutcome::changed(format!("Marked as watched: {}", title)))
        }
    }

    async fn rate(&self, entry: &LibraryEntry, choice: RatingChoice) -> Result<ActionOutcome, ActionError> {
        let title = entry.identity.display_title();
        match choice {
            RatingChoice::Set(rating) => {
                self.api
                    .add_rating(&entry.identity, entry.media_type, rating)
                    .await?;
                Ok(ActionOutcome::changed(format!(
                    "Rated {}: {}/10 ({})",
                    title,
                    rating.value(),
                    rating.description()
                )))
            }
            RatingChoice::Remove => {
                self.api
                    .remove_rating(&entry.identity, entry.media_type)
                    .await?;
                Ok(ActionOutcome::changed(format!("Removed rating: {}", title)))
            }
        }
    }

    async fn sync_item(&self, entry: &LibraryEntry) -> Result<ActionOutcome, ActionError> {
        let title = entry.identity.display_title();
        if !entry.is_watched() {
            return Ok(ActionOutcome::unchanged(format!(
                "Not watched locally, nothing to send: {}",
                title
            )));
        }
        self.engine.push_item(&entry.to_watched_item()).await?;
        Ok(ActionOutcome::changed(format!("Synced to SIMKL: {}", title)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{library_episode, library_movie, ApiCall, FakeApi, MemoryLibrary};
    use scrobble_config::SyncOptions;
    use scrobble_models::{MediaIdentity, MediaIds};
    use tokio_util::sync::CancellationToken;

    fn runner(library: Vec<LibraryEntry>) -> (ActionRunner, Arc<FakeApi>, Arc<MemoryLibrary>, Arc<SyncEngine>) {
        let api = Arc::new(FakeApi::new());
        let library = Arc::new(MemoryLibrary::new(library));
        let engine = Arc::new(
            SyncEngine::new(
                api.clone(),
                library.clone(),
                SyncOptions::default(),
                None,
                CancellationToken::new(),
            )
            .unwrap(),
        );
        let runner = ActionRunner::new(api.clone(), library.clone(), engine.clone());
        (runner, api, library, engine)
    }

    #[test]
    fn test_parse_actions() {
        let action = MenuAction::parse("togglewatched", "episode", 12).unwrap();
        assert_eq!(action.kind, ActionKind::ToggleWatched);
        assert_eq!(action.media_type, MediaType::Episode);

        assert_eq!(
            MenuAction::parse("delete", "movie", 1),
            Err(ActionError::UnknownAction("delete".to_string()))
        );
        assert!(matches!(
            MenuAction::parse("rate", "album", 1),
            Err(ActionError::UnknownMediaType(_))
        ));
        assert!(matches!(
            MenuAction::parse("sync", "show", 1),
            Err(ActionError::Unsupported { .. })
        ));
        assert!(MenuAction::parse("rate", "show", 1).is_ok());
    }

    #[tokio::test]
    async fn test_toggle_marks_unwatched_item_watched() {
        let (runner, api, library, engine) = runner(vec![library_movie(1, "tt0133093", false)]);
        let action = MenuAction::parse("togglewatched", "movie", 1).unwrap();

        let outcome = runner.run(&action, None).await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.message.starts_with("Marked as watched"));
        assert_eq!(api.history().len(), 1);
        assert_eq!(library.watched_count(MediaType::Movie), 1);
        assert_eq!(engine.type_state(MediaType::Movie).pushed.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_unmarks_watched_item() {
        let (runner, api, library, _engine) = runner(vec![library_episode(5, 73739, 2, 3, true)]);
        let action = MenuAction::parse("togglewatched", "episode", 5).unwrap();

        let outcome = runner.run(&action, None).await.unwrap();
        assert!(outcome.message.starts_with("Marked as unwatched"));
        assert!(api.calls().contains(&ApiCall::RemoveHistory(1)));
        assert_eq!(library.watched_count(MediaType::Episode), 0);
    }

    #[tokio::test]
    async fn test_toggle_keeps_local_state_when_remote_fails() {
        let (runner, api, library, _engine) = runner(vec![library_movie(1, "tt0133093", false)]);
        api.fail_with(Some(ApiError::Rejected {
            status: 400,
            body: "bad request".to_string(),
        }));
        let action = MenuAction::parse("togglewatched", "movie", 1).unwrap();

        assert!(runner.run(&action, None).await.is_err());
        assert_eq!(library.watched_count(MediaType::Movie), 0);
    }

    #[tokio::test]
    async fn test_rate_episode_targets_show() {
        let (runner, api, _library, _engine) = runner(vec![library_episode(5, 73739, 2, 3, true)]);
        let action = MenuAction::parse("rate", "episode", 5).unwrap();

        assert_eq!(runner.run(&action, None).await, Err(ActionError::RatingRequired));

        let rating = Rating::new(9).unwrap();
        let outcome = runner
            .run(&action, Some(RatingChoice::Set(rating)))
            .await
            .unwrap();
        assert!(outcome.message.contains("9/10 (Great)"));
        assert!(matches!(
            api.calls().last(),
            Some(ApiCall::AddRating { rating: 9, media_type: MediaType::Episode, .. })
        ));

        runner.run(&action, Some(RatingChoice::Remove)).await.unwrap();
        assert!(matches!(api.calls().last(), Some(ApiCall::RemoveRating { .. })));
    }

    #[tokio::test]
    async fn test_sync_pushes_only_watched_items() {
        let (runner, api, _library, _engine) = runner(vec![
            library_movie(1, "tt0000001", true),
            library_movie(2, "tt0000002", false),
        ]);

        let watched = MenuAction::parse("sync", "movie", 1).unwrap();
        assert!(runner.run(&watched, None).await.unwrap().changed);

        let unwatched = MenuAction::parse("sync", "movie", 2).unwrap();
        assert!(!runner.run(&unwatched, None).await.unwrap().changed);
        assert_eq!(api.history().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_unidentified_items() {
        let unknown = LibraryEntry {
            dbid: 7,
            media_type: MediaType::Movie,
            identity: MediaIdentity::movie(MediaIds::new()).with_title("Home Video", None),
            watched_at: None,
        };
        let (runner, _api, _library, _engine) = runner(vec![unknown]);

        let missing = MenuAction::parse("sync", "movie", 99).unwrap();
        assert!(matches!(
            runner.run(&missing, None).await,
            Err(ActionError::Library(LibraryError::NotFound { dbid: 99, .. }))
        ));

        let home_video = MenuAction::parse("togglewatched", "movie", 7).unwrap();
        assert_eq!(
            runner.run(&home_video, None).await,
            Err(ActionError::Unidentified("Home Video".to_string()))
        );
    }
}
