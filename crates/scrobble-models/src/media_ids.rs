use serde::{Deserialize, Serialize};

/// External identifiers for a movie or show
///
/// For episodes these are the identifiers of the parent show; the episode
/// itself is addressed by season/episode number (see `MediaIdentity`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MediaIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simkl: Option<u64>,
}

/// Strip slashes and whitespace from an IMDb id, rejecting anything that is
/// not a `tt` identifier.
pub fn normalize_imdb_id(raw: &str) -> Option<String> {
    let cleaned: String = raw.trim().replace('/', "");
    if cleaned.starts_with("tt") && cleaned.len() > 2 {
        Some(cleaned)
    } else {
        None
    }
}

impl MediaIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_imdb(mut self, imdb: &str) -> Self {
        self.imdb = normalize_imdb_id(imdb);
        self
    }

    pub fn with_tmdb(mut self, tmdb: u32) -> Self {
        self.tmdb = Some(tmdb);
        self
    }

    pub fn with_tvdb(mut self, tvdb: u32) -> Self {
        self.tvdb = Some(tvdb);
        self
    }

    pub fn with_simkl(mut self, simkl: u64) -> Self {
        self.simkl = Some(simkl);
        self
    }

    /// Check if all ID fields are empty
    pub fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.tmdb.is_none() && self.tvdb.is_none() && self.simkl.is_none()
    }

    /// Merge IDs from another source, only filling in missing values.
    pub fn merge(&mut self, other: &MediaIds) {
        if self.imdb.is_none() {
            self.imdb = other.imdb.clone();
        }
        if self.tmdb.is_none() {
            self.tmdb = other.tmdb;
        }
        if self.tvdb.is_none() {
            self.tvdb = other.tvdb;
        }
        if self.simkl.is_none() {
            self.simkl = other.simkl;
        }
    }

    /// Every available ID rendered as a `kind:value` key
    ///
    /// Two items refer to the same title when any of their keys are equal.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(4);
        if let Some(imdb) = &self.imdb {
            keys.push(format!("imdb:{}", imdb));
        }
        if let Some(tmdb) = self.tmdb {
            keys.push(format!("tmdb:{}", tmdb));
        }
        if let Some(tvdb) = self.tvdb {
            keys.push(format!("tvdb:{}", tvdb));
        }
        if let Some(simkl) = self.simkl {
            keys.push(format!("simkl:{}", simkl));
        }
        keys
    }

    /// The preferred key (imdb, then tmdb, tvdb, simkl)
    pub fn primary_key(&self) -> Option<String> {
        self.keys().into_iter().next()
    }

    /// Check if two sets of IDs share any common ID
    pub fn matches(&self, other: &MediaIds) -> bool {
        if let (Some(a), Some(b)) = (&self.imdb, &other.imdb) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (self.tmdb, other.tmdb) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (self.tvdb, other.tvdb) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (self.simkl, other.simkl) {
            if a == b {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_imdb_id() {
        assert_eq!(normalize_imdb_id("tt0133093"), Some("tt0133093".to_string()));
        assert_eq!(normalize_imdb_id(" /tt0133093/ "), Some("tt0133093".to_string()));
        assert_eq!(normalize_imdb_id("12345"), None);
        assert_eq!(normalize_imdb_id("tt"), None);
    }

    #[test]
    fn test_primary_key_prefers_imdb() {
        let ids = MediaIds::new().with_tmdb(603).with_imdb("tt0133093");
        assert_eq!(ids.primary_key(), Some("imdb:tt0133093".to_string()));

        let ids = MediaIds::new().with_tvdb(81189).with_simkl(17465);
        assert_eq!(ids.primary_key(), Some("tvdb:81189".to_string()));
        assert_eq!(MediaIds::new().primary_key(), None);
    }

    #[test]
    fn test_matches_on_any_shared_id() {
        let local = MediaIds::new().with_tmdb(603);
        let remote = MediaIds::new().with_imdb("tt0133093").with_tmdb(603);
        assert!(local.matches(&remote));

        let other = MediaIds::new().with_imdb("tt0234215");
        assert!(!local.matches(&other));
    }

    #[test]
    fn test_merge_fills_missing_only() {
        let mut ids = MediaIds::new().with_imdb("tt0133093");
        ids.merge(&MediaIds::new().with_imdb("tt9999999").with_tmdb(603));
        assert_eq!(ids.imdb.as_deref(), Some("tt0133093"));
        assert_eq!(ids.tmdb, Some(603));
    }
}
