pub mod actions;
pub mod exclusion;
pub mod ledger;
pub mod library;
pub mod reconcile;
pub mod scrobbler;
pub mod service;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::{ActionError, ActionKind, ActionOutcome, ActionRunner, MenuAction, RatingChoice};
pub use exclusion::{normalize_path, ExclusionFilter, ExclusionRule};
pub use ledger::{LedgerStorage, SyncState, TypeState};
pub use library::{FileLibrary, LibraryEntry, LibraryError, LibraryStore};
pub use reconcile::{reconcile, PruneMode, SyncDelta, SyncDirections};
pub use scrobbler::{Emission, EmissionFailure, PlaybackSession, ScrobbleError, Scrobbler, SessionState, Transition};
pub use service::{
    Scheduler, ScrobbleService, ServiceEvent, ServiceHandle, ServiceNotice, ServiceStopped, SyncReason, SyncTrigger,
};
pub use sync::{ItemFailure, SyncDirection, SyncEngine, SyncError, SyncMode, SyncReport};
