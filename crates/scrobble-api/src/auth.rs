use crate::client::SimklClient;
use crate::error::ApiError;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// PIN issued by `/oauth/pin` for the user to enter at the verification URL
#[derive(Debug, Clone, Deserialize)]
pub struct PinCode {
    pub user_code: String,
    pub verification_url: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_expires_in() -> u64 {
    900
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("the PIN expired before it was entered")]
    Expired,

    #[error("authorization failed: {0}")]
    Denied(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinPoll {
    Authorized(String),
    Pending,
    SlowDown,
}

#[derive(Debug, Deserialize)]
struct PinStatus {
    result: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Interpret one `/oauth/pin/{code}` poll response
pub fn interpret_pin_status(response: Value) -> Result<PinPoll, AuthError> {
    let status: PinStatus = serde_json::from_value(response).map_err(ApiError::from)?;
    match status.result.as_str() {
        "OK" => status
            .access_token
            .filter(|t| !t.is_empty())
            .map(PinPoll::Authorized)
            .ok_or_else(|| AuthError::Denied("authorized but no access token returned".to_string())),
        "KO" => match status.message.as_deref() {
            None | Some("Authorization pending") => Ok(PinPoll::Pending),
            Some("Slow down") => Ok(PinPoll::SlowDown),
            Some(other) => Err(AuthError::Denied(other.to_string())),
        },
        other => Err(AuthError::Denied(format!("unexpected result '{}'", other))),
    }
}

pub async fn request_pin(client: &SimklClient) -> Result<PinCode, ApiError> {
    let endpoint = format!("/oauth/pin?client_id={}", client.client_id());
    let response = client.request(Method::GET, &endpoint, None).await?;
    Ok(serde_json::from_value(response)?)
}

/// Poll until the user enters the PIN or it expires. SIMKL tokens do not expire.
pub async fn wait_for_token(client: &SimklClient, pin: &PinCode) -> Result<String, AuthError> {
    let deadline = Instant::now() + Duration::from_secs(pin.expires_in);
    let mut interval = Duration::from_secs(pin.interval.max(1));
    let endpoint = format!("/oauth/pin/{}?client_id={}", pin.user_code, client.client_id());

    loop {
        sleep(interval).await;
        if Instant::now() >= deadline {
            return Err(AuthError::Expired);
        }

        let response = client.request(Method::GET, &endpoint, None).await?;
        match interpret_pin_status(response)? {
            PinPoll::Authorized(token) => {
                info!("SIMKL authorization granted");
                return Ok(token);
            }
            PinPoll::Pending => debug!("Authorization pending"),
            PinPoll::SlowDown => {
                interval *= 2;
                debug!(interval_secs = interval.as_secs(), "SIMKL asked to slow down polling");
            }
        }
    }
}

/// Full PIN flow; `on_pin` shows the code to the user
pub async fn authenticate<F>(client: &SimklClient, on_pin: F) -> Result<String, AuthError>
where
    F: FnOnce(&PinCode),
{
    let pin = request_pin(client).await?;
    on_pin(&pin);
    wait_for_token(client, &pin).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pin_status_outcomes() {
        assert_eq!(
            interpret_pin_status(json!({"result": "OK", "access_token": "abc"})).unwrap(),
            PinPoll::Authorized("abc".to_string())
        );
        assert_eq!(
            interpret_pin_status(json!({"result": "KO", "message": "Authorization pending"})).unwrap(),
            PinPoll::Pending
        );
        assert_eq!(
            interpret_pin_status(json!({"result": "KO", "message": "Slow down"})).unwrap(),
            PinPoll::SlowDown
        );
        assert!(matches!(
            interpret_pin_status(json!({"result": "KO", "message": "Code expired"})),
            Err(AuthError::Denied(_))
        ));
        assert!(interpret_pin_status(json!({"result": "OK"})).is_err());
    }

    #[test]
    fn test_pin_code_defaults() {
        let pin: PinCode = serde_json::from_value(json!({
            "user_code": "A1B2C",
            "verification_url": "https://simkl.com/pin"
        }))
        .unwrap();
        assert_eq!(pin.interval, 5);
        assert_eq!(pin.expires_in, 900);
    }
}
