use crate::client::SimklClient;
use crate::error::ApiError;
use crate::payload::{self, Activities};
use crate::traits::{ScrobbleAction, SimklApi};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use scrobble_models::{MediaIdentity, MediaType, Rating, WatchedItem};
use serde_json::Value;
use tracing::{debug, info};

/// SIMKL caps how many entries one history call should carry
pub const HISTORY_BATCH_SIZE: usize = 100;

fn watched_endpoint(collection: &str, status: &str, date_from: Option<DateTime<Utc>>) -> String {
    let mut endpoint = format!("/sync/all-items/{}/{}?episode_watched_at=yes", collection, status);
    if let Some(date) = date_from {
        endpoint.push_str("&date_from=");
        endpoint.push_str(&payload::format_timestamp(&date));
    }
    endpoint
}

impl SimklClient {
    async fn post_history(&self, endpoint: &str, items: &[WatchedItem], with_watched_at: bool) -> Result<(), ApiError> {
        for batch in items.chunks(HISTORY_BATCH_SIZE) {
            let body = payload::history_body(batch, with_watched_at);
            if body.as_object().map_or(true, |o| o.is_empty()) {
                continue;
            }
            let response = self.request(Method::POST, endpoint, Some(&body)).await?;
            debug!(endpoint = endpoint, items = batch.len(), response = %response, "History batch sent");
        }
        Ok(())
    }

    /// Account name of the authorized user
    pub async fn fetch_username(&self) -> Result<Option<String>, ApiError> {
        let settings = self.request(Method::GET, "/users/settings", None).await?;
        Ok(settings
            .pointer("/user/name")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl SimklApi for SimklClient {
    async fn scrobble(
        &self,
        action: ScrobbleAction,
        identity: &MediaIdentity,
        media_type: MediaType,
        progress: f64,
    ) -> Result<(), ApiError> {
        let body = payload::scrobble_body(identity, media_type, progress)?;
        let response = self.request(Method::POST, &action.endpoint(), Some(&body)).await?;
        debug!(action = %action, item = %identity.display_title(), response = %response, "Scrobble accepted");
        Ok(())
    }

    async fn add_to_history(&self, items: &[WatchedItem]) -> Result<(), ApiError> {
        self.post_history("/sync/history", items, true).await
    }

    async fn remove_from_history(&self, items: &[WatchedItem]) -> Result<(), ApiError> {
        self.post_history("/sync/history/remove", items, false).await
    }

    async fn get_watched(
        &self,
        media_type: MediaType,
        date_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<WatchedItem>, ApiError> {
        let collection = media_type.collection();
        let mut items = {
            let response = self
                .request(Method::GET, &watched_endpoint(collection, "completed", date_from), None)
                .await?;
            payload::parse_watched(response, media_type)?
        };

        // Shows still airing sit in "watching" but carry watched episodes
        if media_type == MediaType::Episode {
            let response = self
                .request(Method::GET, &watched_endpoint(collection, "watching", date_from), None)
                .await?;
            items.extend(payload::parse_watched(response, media_type)?);
        }

        info!(
            media_type = %media_type,
            count = items.len(),
            delta = date_from.is_some(),
            "Fetched remote watched items"
        );
        Ok(items)
    }

    async fn get_activities(&self) -> Result<Activities, ApiError> {
        let response = self.request(Method::POST, "/sync/activities", None).await?;
        Ok(serde_json::from_value(response)?)
    }

    async fn add_rating(
        &self,
        identity: &MediaIdentity,
        media_type: MediaType,
        rating: Rating,
    ) -> Result<(), ApiError> {
        let body = payload::rating_body(identity, media_type, Some(rating));
        self.request(Method::POST, "/sync/ratings", Some(&body)).await?;
        Ok(())
    }

    async fn remove_rating(&self, identity: &MediaIdentity, media_type: MediaType) -> Result<(), ApiError> {
        let body = payload::rating_body(identity, media_type, None);
        self.request(Method::POST, "/sync/ratings/remove", Some(&body)).await?;
        Ok(())
    }
}
