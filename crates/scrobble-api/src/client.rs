use crate::error::ApiError;
use backon::{ExponentialBuilder, Retryable};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};
use scrobble_config::{RetryConfig, SimklConfig};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 300;

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 409: SIMKL already recorded this scrobble recently
    AlreadyRecorded,
    Transient,
    Unauthorized,
    Rejected,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        409 => StatusClass::AlreadyRecorded,
        401 => StatusClass::Unauthorized,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Rejected,
    }
}

/// Turn a status and body into the request outcome
pub fn interpret_response(status: u16, body: &str) -> Result<Value, ApiError> {
    match classify_status(status) {
        StatusClass::Success => {
            if status == 204 || body.trim().is_empty() {
                Ok(json!({ "success": true }))
            } else {
                Ok(serde_json::from_str(body)?)
            }
        }
        StatusClass::AlreadyRecorded => {
            Ok(serde_json::from_str(body).unwrap_or_else(|_| json!({ "success": true, "conflict": true })))
        }
        StatusClass::Transient => Err(ApiError::transient(
            Some(status),
            format!("HTTP {}: {}", status, truncate(body)),
        )),
        StatusClass::Unauthorized => Err(ApiError::Unauthorized),
        StatusClass::Rejected => Err(ApiError::Rejected {
            status,
            body: truncate(body),
        }),
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is spent
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, attempt: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    attempt
        .retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(ApiError::is_transient)
        .notify(|err: &ApiError, delay: Duration| {
            warn!(
                operation = operation,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "Transient SIMKL failure, retrying"
            );
        })
        .await
}

/// HTTP transport for the SIMKL API
#[derive(Clone)]
pub struct SimklClient {
    http: Client,
    api_base: String,
    client_id: String,
    access_token: Option<String>,
    retry: RetryPolicy,
}

impl SimklClient {
    pub fn new(config: &SimklConfig) -> Result<Self, ApiError> {
        if config.client_id.trim().is_empty() {
            return Err(ApiError::Config("client_id is empty".to_string()));
        }
        let http = Client::builder()
            .user_agent(concat!("simkl-scrobbler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            access_token: None,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Send one logical request, retrying transient failures per the policy.
    ///
    /// `endpoint` is the path below the API base, including any query string.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> Result<Value, ApiError> {
        with_retry(&self.retry, endpoint, || {
            self.send_once(method.clone(), endpoint, payload)
        })
        .await
    }

    async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.api_base, endpoint);
        debug!(method = %method, endpoint = endpoint, authorized = self.access_token.is_some(), "SIMKL request");

        let mut builder = self
            .http
            .request(method, &url)
            .header("simkl-api-key", &self.client_id)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = payload {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(endpoint = endpoint, status = status, "SIMKL response");

        interpret_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(201), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
        assert_eq!(classify_status(409), StatusClass::AlreadyRecorded);
        assert_eq!(classify_status(429), StatusClass::Transient);
        assert_eq!(classify_status(503), StatusClass::Transient);
        assert_eq!(classify_status(401), StatusClass::Unauthorized);
        assert_eq!(classify_status(404), StatusClass::Rejected);
        assert_eq!(classify_status(400), StatusClass::Rejected);
    }

    #[test]
    fn test_interpret_no_content() {
        assert_eq!(interpret_response(204, "").unwrap(), json!({ "success": true }));
        assert_eq!(interpret_response(200, "  ").unwrap(), json!({ "success": true }));
    }

    #[test]
    fn test_interpret_conflict_is_success() {
        let value = interpret_response(409, r#"{"watched_at":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(value["watched_at"], "2024-01-01T00:00:00Z");
        assert_eq!(interpret_response(409, "busy").unwrap()["conflict"], true);
    }

    #[test]
    fn test_interpret_errors() {
        assert_eq!(interpret_response(401, ""), Err(ApiError::Unauthorized));
        assert!(matches!(
            interpret_response(404, "not found"),
            Err(ApiError::Rejected { status: 404, .. })
        ));
        assert!(interpret_response(502, "bad gateway").unwrap_err().is_transient());
        assert!(matches!(interpret_response(200, "{oops"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            min_delay_ms: 250,
            max_delay_ms: 4000,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.min_delay, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), ApiError> = with_retry(&fast_policy(3), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::transient(Some(503), "unavailable"))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = with_retry(&fast_policy(4), "test", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::transient(Some(429), "slow down"))
            } else {
                Ok(json!({ "success": true }))
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), ApiError> = with_retry(&fast_policy(5), "test", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Unauthorized)
        })
        .await;

        assert_eq!(result, Err(ApiError::Unauthorized));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_requires_client_id() {
        let config = SimklConfig {
            client_id: " ".to_string(),
            api_base: "https://api.simkl.com/".to_string(),
            timeout_secs: 5,
            retry: RetryConfig::default(),
        };
        assert!(matches!(SimklClient::new(&config), Err(ApiError::Config(_))));

        let config = SimklConfig {
            client_id: "abc".to_string(),
            ..config
        };
        let client = SimklClient::new(&config).unwrap();
        assert_eq!(client.api_base(), "https://api.simkl.com");
        assert!(!client.is_authenticated());
        assert!(client.with_access_token("t").is_authenticated());
    }
}
