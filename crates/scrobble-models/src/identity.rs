use crate::media::MediaType;
use crate::media_ids::MediaIds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Season/episode position of an episode within its show
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeNumber {
    pub season: u32,
    pub number: u32,
}

impl EpisodeNumber {
    pub fn new(season: u32, number: u32) -> Self {
        Self { season, number }
    }
}

impl fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.number)
    }
}

/// What a piece of media is, as far as the remote service is concerned
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaIdentity {
    /// Movie ids, or the show's ids for an episode
    #[serde(default)]
    pub ids: MediaIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeNumber>,
}

impl MediaIdentity {
    pub fn movie(ids: MediaIds) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    pub fn episode(show_ids: MediaIds, season: u32, number: u32) -> Self {
        Self {
            ids: show_ids,
            episode: Some(EpisodeNumber::new(season, number)),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>, year: Option<u32>) -> Self {
        self.title = Some(title.into());
        self.year = year;
        self
    }

    /// An identity is usable once at least one external ID is known
    pub fn is_identified(&self) -> bool {
        !self.ids.is_empty()
    }

    /// Uniqueness key for this identity under the given media type
    pub fn key(&self, media_type: MediaType) -> Option<IdentityKey> {
        let id = self.ids.primary_key()?;
        Some(IdentityKey {
            media_type,
            id,
            episode: self.episode,
        })
    }

    /// Every key this identity can be matched under
    pub fn match_keys(&self, media_type: MediaType) -> Vec<IdentityKey> {
        self.ids
            .keys()
            .into_iter()
            .map(|id| IdentityKey {
                media_type,
                id,
                episode: self.episode,
            })
            .collect()
    }

    /// Whether two identities refer to the same movie or the same episode
    pub fn same_item(&self, other: &MediaIdentity) -> bool {
        self.episode == other.episode && self.ids.matches(&other.ids)
    }

    /// Human readable label, e.g. `The Matrix (1999)` or `Lost S01E02`
    pub fn display_title(&self) -> String {
        let title = self.title.clone().unwrap_or_else(|| {
            self.ids
                .primary_key()
                .unwrap_or_else(|| "Unknown".to_string())
        });
        match (self.episode, self.year) {
            (Some(episode), _) => format!("{} {}", title, episode),
            (None, Some(year)) => format!("{} ({})", title, year),
            (None, None) => title,
        }
    }
}

/// Identity key of a watched item: media type, preferred external ID and,
/// for episodes, the season/episode number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub media_type: MediaType,
    pub id: String,
    pub episode: Option<EpisodeNumber>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.episode {
            Some(episode) => write!(f, "{}:{}:{}", self.media_type, self.id, episode),
            None => write!(f, "{}:{}", self.media_type, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unidentified_without_ids() {
        let identity = MediaIdentity::default().with_title("Home Video", None);
        assert!(!identity.is_identified());
        assert!(identity.key(MediaType::Movie).is_none());
    }

    #[test]
    fn test_episode_key_includes_position() {
        let show = MediaIds::new().with_tvdb(73739);
        let e1 = MediaIdentity::episode(show.clone(), 1, 1);
        let e2 = MediaIdentity::episode(show, 1, 2);
        assert_ne!(e1.key(MediaType::Episode), e2.key(MediaType::Episode));
        assert!(!e1.same_item(&e2));
        assert_eq!(
            e1.key(MediaType::Episode).unwrap().to_string(),
            "episode:tvdb:73739:S01E01"
        );
    }

    #[test]
    fn test_display_title() {
        let movie = MediaIdentity::movie(MediaIds::new().with_imdb("tt0133093"))
            .with_title("The Matrix", Some(1999));
        assert_eq!(movie.display_title(), "The Matrix (1999)");

        let episode = MediaIdentity::episode(MediaIds::new().with_tvdb(73739), 1, 2)
            .with_title("Lost", None);
        assert_eq!(episode.display_title(), "Lost S01E02");
    }
}
