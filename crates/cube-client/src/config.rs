//! Connection + credential configuration for the semantic layer.

use crate::error::{CubeError, Result};
use crate::safety::redact_url;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Raw connection settings, as collected from CLI/env by the caller.
#[derive(Clone)]
pub struct CubeConfig {
    /// Base URL of the REST API, e.g. `https://cube.example/cubejs-api/v1`.
    pub endpoint: String,
    /// Either a signing secret or a pre-generated JWT.
    pub api_secret: String,
    /// Claims merged into every signed token.
    pub token_payload: Map<String, Value>,
    /// Lifetime of signed tokens.
    pub token_ttl: Duration,
}

impl fmt::Debug for CubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CubeConfig")
            .field("endpoint", &self.endpoint)
            .field("api_secret", &"[REDACTED]")
            .field("token_payload_keys", &self.token_payload.keys().collect::<Vec<_>>())
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl CubeConfig {
    pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_secret: api_secret.into(),
            token_payload: Map::new(),
            token_ttl: Self::DEFAULT_TOKEN_TTL,
        }
    }

    #[must_use]
    pub fn with_token_payload(mut self, payload: Map<String, Value>) -> Self {
        self.token_payload = payload;
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Check everything that can be checked before the first request.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] if the endpoint is not an absolute http(s) URL or the secret
    /// is empty. The secret value is never part of the message.
    pub fn validate(&self) -> Result<Url> {
        if self.api_secret.trim().is_empty() {
            return Err(CubeError::Config(
                "API secret (or pre-generated token) is required".to_string(),
            ));
        }
        parse_endpoint(&self.endpoint)
    }
}

/// Parse and normalize the endpoint.
///
/// # Errors
///
/// Returns [`CubeError::Config`] if the endpoint is empty, unparsable or not http(s).
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(CubeError::Config("endpoint is required".to_string()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| CubeError::Config(format!("Invalid endpoint: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CubeError::Config(format!(
            "Invalid endpoint '{}': unsupported scheme '{}'",
            redact_url(&url),
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(CubeError::Config(format!(
            "Invalid endpoint '{}': not a base URL",
            redact_url(&url)
        )));
    }
    Ok(url)
}

/// Parse a signing payload given as JSON text. Only objects are accepted.
///
/// # Errors
///
/// Returns [`CubeError::Config`] if the text is not valid JSON or not a JSON object.
pub fn parse_token_payload(raw: &str) -> Result<Map<String, Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    let v: Value = serde_json::from_str(raw)
        .map_err(|e| CubeError::Config(format!("Invalid JSON in token payload: {e}")))?;
    match v {
        Value::Object(obj) => Ok(obj),
        _ => Err(CubeError::Config(
            "token payload must be a JSON object".to_string(),
        )),
    }
}
