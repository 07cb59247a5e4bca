//! Authenticated request execution against the semantic-layer REST API.
//!
//! One logical request may turn into several HTTP calls:
//! - a `403` triggers one forced token refresh and exactly one retry;
//! - a `Continue wait` body is polled again after a fixed backoff until the time since the first
//!   attempt reaches the configured ceiling.
//!
//! Everything else (other non-2xx statuses, transport errors, non-JSON bodies) fails immediately.

use crate::error::{CubeError, Result};
use crate::safety::{redact_url, sanitize_response_for_logging, truncate_message};
use crate::token::TokenManager;
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use url::Url;

/// Body `error` value the remote API uses for "query still running, ask again".
pub const CONTINUE_WAIT: &str = "Continue wait";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Schema description.
    Meta,
    /// Query execution.
    Load,
}

impl Route {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between "continue wait" polls.
    pub backoff: Duration,
    /// Ceiling on the accumulated backoff for one logical request.
    pub max_wait: Duration,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum Attempt {
    Success(Value),
    Forbidden,
    ContinueWait,
}

pub struct RequestExecutor {
    endpoint: Url,
    client: Client,
    tokens: Arc<TokenManager>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(endpoint: Url, tokens: Arc<TokenManager>, policy: RetryPolicy) -> Self {
        Self::with_client(endpoint, tokens, policy, Client::new())
    }

    #[must_use]
    pub fn with_client(
        endpoint: Url,
        tokens: Arc<TokenManager>,
        policy: RetryPolicy,
        client: Client,
    ) -> Self {
        Self {
            endpoint,
            client,
            tokens,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Execute one logical request and return the decoded JSON body.
    ///
    /// Every parameter is sent as a query-string entry holding its JSON serialization.
    ///
    /// # Errors
    ///
    /// - [`CubeError::Authentication`] on a `403` that a refresh cannot fix
    /// - [`CubeError::Transient`] when the remote keeps answering "continue wait"
    /// - [`CubeError::Request`] on any other failure
    /// - [`CubeError::Config`] if a token cannot be signed
    pub async fn execute(&self, route: Route, params: &[(&str, Value)]) -> Result<Value> {
        let url = self.route_url(route)?;
        let mut query: Vec<(&str, String)> = Vec::with_capacity(params.len());
        for (k, v) in params {
            let encoded = serde_json::to_string(v).map_err(|e| {
                CubeError::Request(format!("failed to serialize parameter '{k}': {e}"))
            })?;
            query.push((*k, encoded));
        }

        let started = Instant::now();
        let mut refreshed = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let token = self.tokens.current_token()?;
            debug!(
                route = %route,
                attempt,
                url = %redact_url(&url),
                authorization = "[REDACTED]",
                "sending request"
            );

            match self
                .send_once(route, &url, &query, token.secret_value())
                .await?
            {
                Attempt::Success(body) => return Ok(body),
                Attempt::Forbidden => {
                    if !self.tokens.can_refresh() {
                        error!(route = %route, "authentication failed with pre-generated token");
                        return Err(CubeError::Authentication(
                            "the pre-generated API token was rejected; check the configured token"
                                .to_string(),
                        ));
                    }
                    if refreshed {
                        error!(route = %route, "authentication failed again after token refresh");
                        return Err(CubeError::Authentication(
                            "request was rejected (403) even after refreshing the token"
                                .to_string(),
                        ));
                    }
                    warn!(route = %route, "received 403, attempting token refresh");
                    self.tokens.force_refresh()?;
                    refreshed = true;
                }
                Attempt::ContinueWait => {
                    let waited = started.elapsed();
                    if waited >= self.policy.max_wait {
                        error!(
                            route = %route,
                            waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                            "request timed out waiting for the query to finish"
                        );
                        return Err(CubeError::Transient(format!(
                            "still processing after {}s. Something may have gone wrong or the request may be too complex",
                            waited.as_secs()
                        )));
                    }
                    warn!(
                        route = %route,
                        backoff_ms = u64::try_from(self.policy.backoff.as_millis()).unwrap_or(u64::MAX),
                        "request incomplete, polling again"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        route: Route,
        url: &Url,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<Attempt> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .header(AUTHORIZATION, token)
            .timeout(self.policy.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Ok(Attempt::Forbidden);
        }

        let bytes = response.bytes().await?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();
        let error_field = body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str);

        if error_field == Some(CONTINUE_WAIT) {
            return Ok(Attempt::ContinueWait);
        }

        if let Some(body) = body.as_ref() {
            debug!(
                route = %route,
                status = status.as_u16(),
                response = %sanitize_response_for_logging(body),
                "received response"
            );
        }

        let status_code = status.as_u16();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown");
            error!(route = %route, status = status_code, "request failed");
            return Err(CubeError::Request(match error_field {
                Some(err) => format!("API returned {status_code} {reason}: {}", truncate_message(err)),
                None => format!("API returned {status_code} {reason}"),
            }));
        }
        if let Some(err) = error_field {
            error!(route = %route, status = status_code, "request failed with error body");
            return Err(CubeError::Request(truncate_message(err)));
        }
        match body {
            Some(body) => Ok(Attempt::Success(body)),
            None => {
                error!(route = %route, status = status_code, "response body is not JSON");
                Err(CubeError::Request(format!(
                    "API returned {status_code} with a non-JSON body"
                )))
            }
        }
    }

    fn route_url(&self, route: Route) -> Result<Url> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{route}"))
            .map_err(|e| CubeError::Config(format!("Invalid endpoint for route '{route}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CubeConfig;
    use axum::Router;
    use axum::extract::{Query as QueryParams, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(10),
            max_wait: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn executor(base_url: &str, secret: &str) -> RequestExecutor {
        let cfg = CubeConfig::new(base_url, secret);
        let endpoint = cfg.validate().expect("valid config");
        let tokens = Arc::new(TokenManager::new(&cfg).expect("tokens"));
        RequestExecutor::new(endpoint, tokens, fast_policy())
    }

    #[derive(Clone, Default)]
    struct Counters {
        calls: Arc<AtomicUsize>,
    }

    #[tokio::test]
    async fn success_on_first_attempt_does_not_refresh() {
        async fn handler(
            State(c): State<Counters>,
            headers: HeaderMap,
            QueryParams(q): QueryParams<HashMap<String, String>>,
        ) -> Response {
            c.calls.fetch_add(1, Ordering::SeqCst);
            let has_auth = headers.get("authorization").is_some();
            axum::Json(json!({"data": [], "auth": has_auth, "query": q.get("query")}))
                .into_response()
        }

        let counters = Counters::default();
        let app = Router::new()
            .route("/cubejs-api/v1/load", get(handler))
            .with_state(counters.clone());
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let exec = executor(&format!("{}/cubejs-api/v1/", server.base_url()), "s3cret");
        let body = exec
            .execute(Route::Load, &[("query", json!({"measures": ["Orders.count"]}))])
            .await
            .expect("execute");

        assert_eq!(body["auth"], true);
        assert_eq!(body["query"], r#"{"measures":["Orders.count"]}"#);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.tokens().refresh_count(), 0);
    }

    #[tokio::test]
    async fn continue_wait_forever_times_out_after_the_ceiling() {
        async fn handler(State(c): State<Counters>) -> Response {
            c.calls.fetch_add(1, Ordering::SeqCst);
            axum::Json(json!({"error": "Continue wait"})).into_response()
        }

        let counters = Counters::default();
        let app = Router::new()
            .route("/meta", get(handler))
            .with_state(counters.clone());
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let exec = executor(&server.base_url(), "s3cret");
        let err = exec.execute(Route::Meta, &[]).await.unwrap_err();

        assert!(matches!(err, CubeError::Transient(_)), "{err}");
        // At most one initial attempt plus 100ms / 10ms = 10 retries.
        let calls = counters.calls.load(Ordering::SeqCst);
        assert!((2..=11).contains(&calls), "calls = {calls}");
    }

    #[tokio::test]
    async fn continue_wait_with_zero_backoff_still_hits_the_ceiling() {
        async fn handler(State(c): State<Counters>) -> Response {
            c.calls.fetch_add(1, Ordering::SeqCst);
            axum::Json(json!({"error": "Continue wait"})).into_response()
        }

        let counters = Counters::default();
        let app = Router::new()
            .route("/meta", get(handler))
            .with_state(counters.clone());
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let cfg = CubeConfig::new(&server.base_url(), "s3cret");
        let endpoint = cfg.validate().expect("valid config");
        let tokens = Arc::new(TokenManager::new(&cfg).expect("tokens"));
        let policy = RetryPolicy {
            backoff: Duration::ZERO,
            max_wait: Duration::from_millis(100),
            request_timeout: Duration::from_secs(5),
        };
        let exec = RequestExecutor::new(endpoint, tokens, policy);

        let started = std::time::Instant::now();
        let err = tokio::time::timeout(Duration::from_secs(2), exec.execute(Route::Meta, &[]))
            .await
            .expect("polling must stop at the ceiling")
            .unwrap_err();

        assert!(matches!(err, CubeError::Transient(_)), "{err}");
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(counters.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn continue_wait_then_success_returns_body() {
        async fn handler(State(c): State<Counters>) -> Response {
            let n = c.calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                axum::Json(json!({"error": "Continue wait"})).into_response()
            } else {
                axum::Json(json!({"cubes": []})).into_response()
            }
        }

        let counters = Counters::default();
        let app = Router::new()
            .route("/meta", get(handler))
            .with_state(counters.clone());
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let body = executor(&server.base_url(), "s3cret")
            .execute(Route::Meta, &[])
            .await
            .expect("execute");
        assert_eq!(body, json!({"cubes": []}));
        assert_eq!(counters.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried_and_hide_the_body() {
        async fn handler(State(c): State<Counters>) -> Response {
            c.calls.fetch_add(1, Ordering::SeqCst);
            (
                AxumStatus::BAD_REQUEST,
                axum::Json(json!({"error": "Cube 'Nope' not found", "stack": "secret-stack-trace"})),
            )
                .into_response()
        }

        let counters = Counters::default();
        let app = Router::new()
            .route("/load", get(handler))
            .with_state(counters.clone());
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let err = executor(&server.base_url(), "s3cret")
            .execute(Route::Load, &[("query", json!({}))])
            .await
            .unwrap_err();

        assert!(matches!(err, CubeError::Request(_)));
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("Cube 'Nope' not found"));
        assert!(!msg.contains("secret-stack-trace"));
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_request_error() {
        let app = Router::new().route("/meta", get(|| async { "<html>oops</html>" }));
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let err = executor(&server.base_url(), "s3cret")
            .execute(Route::Meta, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CubeError::Request(_)));
        assert!(!err.to_string().contains("oops"));
    }

    #[tokio::test]
    async fn transport_failure_is_a_request_error_without_query_string() {
        let port = cube_mcp_test_support::pick_unused_port().expect("port");
        let err = executor(&format!("http://127.0.0.1:{port}"), "s3cret")
            .execute(Route::Load, &[("query", json!({"measures": ["Secret.measure"]}))])
            .await
            .unwrap_err();
        assert!(matches!(err, CubeError::Request(_)));
        assert!(!err.to_string().contains("Secret.measure"));
    }

    #[tokio::test]
    async fn per_attempt_timeout_is_enforced() {
        async fn slow() -> Response {
            tokio::time::sleep(Duration::from_secs(5)).await;
            axum::Json(json!({})).into_response()
        }

        let app = Router::new().route("/meta", get(slow));
        let server = cube_mcp_test_support::spawn_app(app).await.expect("server");

        let cfg = CubeConfig::new(server.base_url(), "s3cret");
        let endpoint = cfg.validate().expect("valid");
        let tokens = Arc::new(TokenManager::new(&cfg).expect("tokens"));
        let exec = RequestExecutor::new(
            endpoint,
            tokens,
            RetryPolicy {
                request_timeout: Duration::from_millis(100),
                ..fast_policy()
            },
        );

        let started = std::time::Instant::now();
        let err = exec.execute(Route::Meta, &[]).await.unwrap_err();
        assert!(matches!(err, CubeError::Request(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
