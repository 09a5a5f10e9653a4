use crate::identity::MediaIdentity;
use crate::media::MediaType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackEventKind {
    Started,
    Paused,
    Resumed,
    Progress,
    Stopped,
}

/// Normalized notification from the host media player
///
/// Hosts translate their own callbacks into this shape; the JSON form is what
/// the CLI reads line by line from stdin:
///
/// ```json
/// {"kind":"started","media_type":"movie","source_path":"/media/The Matrix.mkv",
///  "identity":{"ids":{"imdb":"tt0133093"},"title":"The Matrix","year":1999}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackEvent {
    pub kind: PlaybackEventKind,
    #[serde(default)]
    pub identity: MediaIdentity,
    pub media_type: MediaType,
    #[serde(default)]
    pub source_path: String,
    /// Percentage of the item played so far (0-100), when the host knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_elapsed: Option<f64>,
}

impl PlaybackEvent {
    pub fn new(kind: PlaybackEventKind, identity: MediaIdentity, media_type: MediaType) -> Self {
        Self {
            kind,
            identity,
            media_type,
            source_path: String::new(),
            percent_elapsed: None,
        }
    }

    pub fn with_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = source_path.into();
        self
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent_elapsed = Some(percent);
        self
    }
}
