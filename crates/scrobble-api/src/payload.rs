//! Conversion between the crate's models and SIMKL's JSON shapes.
//!
//! SIMKL addresses episodes through their show: writes group them as
//! `show -> seasons[number] -> episodes[number]`, and the all-items listing
//! returns them the same way. Reads are expanded back into one
//! [`WatchedItem`] per movie or per watched episode.

use crate::error::ApiError;
use chrono::{DateTime, SecondsFormat, Utc};
use scrobble_models::{
    normalize_imdb_id, MediaIdentity, MediaIds, MediaType, Rating, WatchSource, WatchedItem,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn title_object(identity: &MediaIdentity) -> Map<String, Value> {
    let mut object = Map::new();
    if let Some(title) = &identity.title {
        object.insert("title".to_string(), json!(title));
    }
    if let Some(year) = identity.year {
        object.insert("year".to_string(), json!(year));
    }
    object.insert("ids".to_string(), json!(identity.ids));
    object
}

/// Body for `/scrobble/{start,pause,stop}`
pub fn scrobble_body(
    identity: &MediaIdentity,
    media_type: MediaType,
    progress: f64,
) -> Result<Value, ApiError> {
    let progress = (progress.clamp(0.0, 100.0) * 100.0).round() / 100.0;
    match (media_type, identity.episode) {
        (MediaType::Movie, _) => Ok(json!({
            "progress": progress,
            "movie": title_object(identity),
        })),
        (MediaType::Episode, Some(episode)) => Ok(json!({
            "progress": progress,
            "show": title_object(identity),
            "episode": { "season": episode.season, "number": episode.number },
        })),
        (MediaType::Episode, None) => Err(ApiError::Config(format!(
            "episode {} has no season/episode number",
            identity.display_title()
        ))),
        (other, _) => Err(ApiError::Config(format!("{} items cannot be scrobbled", other))),
    }
}

struct ShowGroup<'a> {
    identity: &'a MediaIdentity,
    seasons: BTreeMap<u32, Vec<Value>>,
}

/// Body for `/sync/history` (with timestamps) or `/sync/history/remove`
pub fn history_body(items: &[WatchedItem], with_watched_at: bool) -> Value {
    let mut movies = Vec::new();
    let mut shows: Vec<ShowGroup> = Vec::new();

    for item in items {
        match item.media_type {
            MediaType::Movie => {
                let mut object = title_object(&item.identity);
                if with_watched_at {
                    object.insert("watched_at".to_string(), json!(format_timestamp(&item.watched_at)));
                }
                movies.push(Value::Object(object));
            }
            MediaType::Episode | MediaType::Show => {
                let index = match shows
                    .iter()
                    .position(|group| group.identity.ids.matches(&item.identity.ids))
                {
                    Some(index) => index,
                    None => {
                        shows.push(ShowGroup {
                            identity: &item.identity,
                            seasons: BTreeMap::new(),
                        });
                        shows.len() - 1
                    }
                };
                if let Some(episode) = item.identity.episode {
                    let mut entry = json!({ "number": episode.number });
                    if with_watched_at {
                        entry["watched_at"] = json!(format_timestamp(&item.watched_at));
                    }
                    shows[index]
                        .seasons
                        .entry(episode.season)
                        .or_default()
                        .push(entry);
                }
            }
            MediaType::Season => {
                tracing::warn!(item = %item.identity.display_title(), "Skipping season-level history entry");
            }
        }
    }

    let shows: Vec<Value> = shows
        .into_iter()
        .map(|group| {
            let mut object = title_object(group.identity);
            object.remove("year");
            if !group.seasons.is_empty() {
                let seasons: Vec<Value> = group
                    .seasons
                    .into_iter()
                    .map(|(number, episodes)| json!({ "number": number, "episodes": episodes }))
                    .collect();
                object.insert("seasons".to_string(), json!(seasons));
            }
            Value::Object(object)
        })
        .collect();

    let mut body = Map::new();
    if !movies.is_empty() {
        body.insert("movies".to_string(), json!(movies));
    }
    if !shows.is_empty() {
        body.insert("shows".to_string(), json!(shows));
    }
    Value::Object(body)
}

/// Body for `/sync/ratings` (`Some`) or `/sync/ratings/remove` (`None`).
///
/// Episodes are rated through their show.
pub fn rating_body(identity: &MediaIdentity, media_type: MediaType, rating: Option<Rating>) -> Value {
    let mut object = title_object(identity);
    if let Some(rating) = rating {
        object.insert("rating".to_string(), json!(rating.value()));
        object.insert("rated_at".to_string(), json!(format_timestamp(&Utc::now())));
    }
    let collection = match media_type {
        MediaType::Movie => "movies",
        MediaType::Episode | MediaType::Show | MediaType::Season => "shows",
    };
    let mut body = Map::new();
    body.insert(collection.to_string(), json!([Value::Object(object)]));
    Value::Object(body)
}

#[derive(Debug, Default, Deserialize)]
struct RemoteIds {
    #[serde(default)]
    simkl: Option<Value>,
    #[serde(default)]
    imdb: Option<String>,
    #[serde(default)]
    tmdb: Option<Value>,
    #[serde(default)]
    tvdb: Option<Value>,
}

/// SIMKL sends numeric ids as numbers or as strings depending on the endpoint
fn numeric_id(value: &Option<Value>) -> Option<u64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RemoteIds {
    fn to_media_ids(&self) -> MediaIds {
        MediaIds {
            imdb: self.imdb.as_deref().and_then(normalize_imdb_id),
            tmdb: numeric_id(&self.tmdb).and_then(|id| u32::try_from(id).ok()),
            tvdb: numeric_id(&self.tvdb).and_then(|id| u32::try_from(id).ok()),
            simkl: numeric_id(&self.simkl),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteTitle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    ids: RemoteIds,
}

impl RemoteTitle {
    fn identity(&self) -> MediaIdentity {
        MediaIdentity {
            ids: self.ids.to_media_ids(),
            title: self.title.clone(),
            year: self.year,
            episode: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteEpisode {
    number: u32,
    #[serde(default)]
    watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RemoteSeason {
    number: u32,
    #[serde(default)]
    episodes: Vec<RemoteEpisode>,
}

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    #[serde(default)]
    last_watched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    movie: Option<RemoteTitle>,
    #[serde(default)]
    show: Option<RemoteTitle>,
    #[serde(default)]
    seasons: Vec<RemoteSeason>,
}

fn entries_of(response: Value, media_type: MediaType) -> Result<Vec<RemoteEntry>, ApiError> {
    let lists: Vec<Value> = match response {
        Value::Null => Vec::new(),
        Value::Array(_) => vec![response],
        Value::Object(mut object) => {
            let keys: &[&str] = match media_type {
                MediaType::Movie => &["movies"],
                _ => &["shows", "anime"],
            };
            keys.iter()
                .filter_map(|key| object.remove(*key))
                .filter(|list| !list.is_null())
                .collect()
        }
        other => {
            return Err(ApiError::Decode(format!(
                "unexpected all-items response: {}",
                other
            )))
        }
    };

    let mut entries = Vec::new();
    for list in lists {
        let batch: Vec<RemoteEntry> = serde_json::from_value(list)?;
        entries.extend(batch);
    }
    Ok(entries)
}

/// Expand a `/sync/all-items` response into watched items of `media_type`
pub fn parse_watched(response: Value, media_type: MediaType) -> Result<Vec<WatchedItem>, ApiError> {
    let mut items = Vec::new();
    for entry in entries_of(response, media_type)? {
        let fallback_time = entry.last_watched_at.unwrap_or_default();
        match media_type {
            MediaType::Movie => {
                let Some(movie) = &entry.movie else { continue };
                let identity = movie.identity();
                if !identity.is_identified() {
                    continue;
                }
                items.push(WatchedItem::new(identity, MediaType::Movie, fallback_time, WatchSource::Remote));
            }
            MediaType::Episode => {
                let Some(show) = &entry.show else { continue };
                let show_identity = show.identity();
                if !show_identity.is_identified() {
                    continue;
                }
                for season in &entry.seasons {
                    for episode in &season.episodes {
                        let mut identity = show_identity.clone();
                        identity.episode = Some(scrobble_models::EpisodeNumber::new(season.number, episode.number));
                        items.push(WatchedItem::new(
                            identity,
                            MediaType::Episode,
                            episode.watched_at.unwrap_or(fallback_time),
                            WatchSource::Remote,
                        ));
                    }
                }
            }
            MediaType::Show | MediaType::Season => {}
        }
    }
    Ok(items)
}

/// Per-collection timestamps from `/sync/activities`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectionActivity {
    #[serde(default)]
    pub all: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub rated_at: Option<String>,
    #[serde(default)]
    pub removed_from_list: Option<String>,
}

/// Last-change timestamps for the account, used to skip fetches when
/// nothing moved on the remote side
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Activities {
    #[serde(default)]
    pub all: Option<String>,
    #[serde(default)]
    pub movies: Option<CollectionActivity>,
    #[serde(default)]
    pub tv_shows: Option<CollectionActivity>,
    #[serde(default)]
    pub anime: Option<CollectionActivity>,
}

fn parse_timestamp(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl Activities {
    fn collections(&self, media_type: MediaType) -> Vec<&CollectionActivity> {
        match media_type {
            MediaType::Movie => self.movies.iter().collect(),
            _ => self.tv_shows.iter().chain(self.anime.iter()).collect(),
        }
    }

    /// Most recent change affecting `media_type`, if SIMKL reported one
    pub fn last_change(&self, media_type: MediaType) -> Option<DateTime<Utc>> {
        self.collections(media_type)
            .into_iter()
            .flat_map(|c| [&c.all, &c.completed, &c.removed_from_list])
            .filter_map(parse_timestamp)
            .max()
    }

    /// Most recent removal; removals are invisible to a `date_from` fetch
    pub fn last_removal(&self, media_type: MediaType) -> Option<DateTime<Utc>> {
        self.collections(media_type)
            .into_iter()
            .filter_map(|c| parse_timestamp(&c.removed_from_list))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 20, 0, 0).unwrap()
    }

    fn episode(tvdb: u32, season: u32, number: u32, title: &str) -> WatchedItem {
        WatchedItem::new(
            MediaIdentity::episode(MediaIds::new().with_tvdb(tvdb), season, number).with_title(title, None),
            MediaType::Episode,
            at(number),
            WatchSource::Local,
        )
    }

    #[test]
    fn test_scrobble_body_for_episode() {
        let identity = MediaIdentity::episode(MediaIds::new().with_tvdb(73739), 1, 2).with_title("Lost", Some(2004));
        let body = scrobble_body(&identity, MediaType::Episode, 42.123).unwrap();
        assert_eq!(body["progress"], 42.12);
        assert_eq!(body["show"]["ids"]["tvdb"], 73739);
        assert_eq!(body["episode"]["season"], 1);
        assert_eq!(body["episode"]["number"], 2);
        assert!(body.get("movie").is_none());
    }

    #[test]
    fn test_scrobble_body_rejects_shows() {
        let identity = MediaIdentity::movie(MediaIds::new().with_tvdb(73739));
        assert!(scrobble_body(&identity, MediaType::Show, 10.0).is_err());
    }

    #[test]
    fn test_history_groups_episodes_by_show_and_season() {
        let items = vec![
            episode(73739, 1, 1, "Lost"),
            episode(81189, 2, 5, "Breaking Bad"),
            episode(73739, 1, 2, "Lost"),
            episode(73739, 2, 1, "Lost"),
            WatchedItem::new(
                MediaIdentity::movie(MediaIds::new().with_imdb("tt0133093")).with_title("The Matrix", Some(1999)),
                MediaType::Movie,
                at(1),
                WatchSource::Local,
            ),
        ];
        let body = history_body(&items, true);

        assert_eq!(body["movies"][0]["ids"]["imdb"], "tt0133093");
        assert_eq!(body["movies"][0]["watched_at"], "2024-03-01T20:00:00Z");

        let shows = body["shows"].as_array().unwrap();
        assert_eq!(shows.len(), 2);
        assert_eq!(shows[0]["title"], "Lost");
        let seasons = shows[0]["seasons"].as_array().unwrap();
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[0]["number"], 1);
        assert_eq!(seasons[0]["episodes"].as_array().unwrap().len(), 2);
        assert_eq!(seasons[1]["episodes"][0]["number"], 1);
    }

    #[test]
    fn test_history_remove_omits_timestamps() {
        let body = history_body(&[episode(73739, 1, 1, "Lost")], false);
        assert!(body["shows"][0]["seasons"][0]["episodes"][0].get("watched_at").is_none());
    }

    #[test]
    fn test_episode_rating_targets_show() {
        let identity = MediaIdentity::episode(MediaIds::new().with_tvdb(73739), 3, 4);
        let rating = Rating::new(9).unwrap();
        let body = rating_body(&identity, MediaType::Episode, Some(rating));
        assert_eq!(body["shows"][0]["rating"], 9);
        assert_eq!(body["shows"][0]["ids"]["tvdb"], 73739);

        let body = rating_body(&identity, MediaType::Episode, None);
        assert!(body["shows"][0].get("rating").is_none());
    }

    #[test]
    fn test_parse_watched_movies_with_string_ids() {
        let response = json!({
            "movies": [
                {"last_watched_at": "2024-02-10T21:00:00Z", "status": "completed",
                 "movie": {"title": "The Matrix", "year": 1999, "ids": {"simkl": 53536, "imdb": "tt0133093", "tmdb": "603"}}},
                {"movie": {"title": "No ids", "ids": {}}}
            ]
        });
        let items = parse_watched(response, MediaType::Movie).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identity.ids.tmdb, Some(603));
        assert_eq!(items[0].identity.ids.simkl, Some(53536));
        assert_eq!(items[0].source, WatchSource::Remote);
        assert_eq!(items[0].watched_at, Utc.with_ymd_and_hms(2024, 2, 10, 21, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_watched_expands_episodes() {
        let response = json!({
            "shows": [{
                "last_watched_at": "2024-02-10T21:00:00Z",
                "show": {"title": "Lost", "ids": {"tvdb": "73739"}},
                "seasons": [
                    {"number": 1, "episodes": [{"number": 1, "watched_at": "2024-01-01T10:00:00Z"}, {"number": 2}]}
                ]
            }]
        });
        let items = parse_watched(response, MediaType::Episode).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identity.episode.unwrap().number, 1);
        assert_eq!(items[0].watched_at, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(items[1].watched_at, Utc.with_ymd_and_hms(2024, 2, 10, 21, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_watched_empty_responses() {
        assert!(parse_watched(Value::Null, MediaType::Movie).unwrap().is_empty());
        assert!(parse_watched(json!({"movies": null}), MediaType::Movie).unwrap().is_empty());
        assert!(parse_watched(json!("nope"), MediaType::Movie).is_err());
    }

    #[test]
    fn test_activities_last_change() {
        let activities: Activities = serde_json::from_value(json!({
            "all": "2024-03-05T10:00:00Z",
            "movies": {"all": "2024-03-01T10:00:00Z", "completed": "2024-03-02T10:00:00Z"},
            "tv_shows": {"all": "2024-02-01T10:00:00Z"},
            "anime": {"all": "2024-03-04T10:00:00Z", "removed_from_list": null}
        }))
        .unwrap();
        assert_eq!(
            activities.last_change(MediaType::Movie),
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap())
        );
        assert_eq!(
            activities.last_change(MediaType::Episode),
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap())
        );
        assert_eq!(Activities::default().last_change(MediaType::Movie), None);
        assert_eq!(activities.last_removal(MediaType::Episode), None);
    }
}
