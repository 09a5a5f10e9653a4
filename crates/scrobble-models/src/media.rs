use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media a playback event, watched item or rating refers to.
///
/// Only movies and episodes are scrobbled and reconciled. Shows and seasons
/// appear as context-menu targets and as rating targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Episode,
    Show,
    Season,
}

impl MediaType {
    /// Media types that take part in scrobbling and watched-state sync
    pub const SYNCABLE: [MediaType; 2] = [MediaType::Movie, MediaType::Episode];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Episode => "episode",
            MediaType::Show => "show",
            MediaType::Season => "season",
        }
    }

    /// Whether items of this type carry their own watched state
    pub fn is_syncable(&self) -> bool {
        match self {
            MediaType::Movie | MediaType::Episode => true,
            MediaType::Show | MediaType::Season => false,
        }
    }

    /// Collection name used by the remote history endpoints
    /// (episodes are grouped under their show).
    pub fn collection(&self) -> &'static str {
        match self {
            MediaType::Movie => "movies",
            MediaType::Episode | MediaType::Show | MediaType::Season => "shows",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media type: {0}")]
pub struct UnknownMediaType(pub String);

impl FromStr for MediaType {
    type Err = UnknownMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaType::Movie),
            "episode" | "episodes" => Ok(MediaType::Episode),
            "show" | "shows" | "tvshow" => Ok(MediaType::Show),
            "season" | "seasons" => Ok(MediaType::Season),
            other => Err(UnknownMediaType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_type_aliases() {
        assert_eq!("Movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("episodes".parse::<MediaType>().unwrap(), MediaType::Episode);
        assert_eq!("tvshow".parse::<MediaType>().unwrap(), MediaType::Show);
        assert!("song".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_unknown_media_type_message() {
        let err = "Song".parse::<MediaType>().unwrap_err();
        assert_eq!(err, UnknownMediaType("song".to_string()));
        assert_eq!(err.to_string(), "unknown media type: song");
    }

    #[test]
    fn test_only_movies_and_episodes_sync() {
        assert!(MediaType::Movie.is_syncable());
        assert!(MediaType::Episode.is_syncable());
        assert!(!MediaType::Show.is_syncable());
        assert!(!MediaType::Season.is_syncable());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&MediaType::Episode).unwrap();
        assert_eq!(json, "\"episode\"");
    }
}
