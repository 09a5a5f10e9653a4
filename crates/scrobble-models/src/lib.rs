pub mod identity;
pub mod media;
pub mod media_ids;
pub mod playback;
pub mod rating;
pub mod watched_item;

pub use identity::{EpisodeNumber, IdentityKey, MediaIdentity};
pub use media::{MediaType, UnknownMediaType};
pub use media_ids::{normalize_imdb_id, MediaIds};
pub use playback::{PlaybackEvent, PlaybackEventKind};
pub use rating::{InvalidRating, Rating};
pub use watched_item::{WatchSource, WatchedItem};
