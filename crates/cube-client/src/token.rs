//! Authentication token lifecycle.
//!
//! Two modes are supported:
//! - [`AuthMode::Signed`]: we hold the API secret and mint HS256 JWTs on demand.
//! - [`AuthMode::Pregenerated`]: we were handed a finished JWT and can only pass it along.
//!
//! The cached token lives behind a `parking_lot::RwLock`. The lock only ever guards the
//! in-memory value; it is never held across network I/O.

use crate::config::CubeConfig;
use crate::error::{CubeError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub enum AuthMode {
    Signed {
        secret: Arc<[u8]>,
        payload: Map<String, Value>,
        ttl: Duration,
    },
    Pregenerated {
        token: Arc<str>,
    },
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed { payload, ttl, .. } => f
                .debug_struct("Signed")
                .field("secret", &"[REDACTED]")
                .field("payload_keys", &payload.keys().collect::<Vec<_>>())
                .field("ttl", ttl)
                .finish(),
            Self::Pregenerated { .. } => f
                .debug_struct("Pregenerated")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl AuthMode {
    /// Infer the mode from the configured secret.
    ///
    /// A value shaped like a compact JWT (three non-empty base64url segments) is used as-is;
    /// anything else is a signing secret.
    #[must_use]
    pub fn infer(config: &CubeConfig) -> Self {
        if looks_like_jwt(&config.api_secret) {
            Self::Pregenerated {
                token: Arc::from(config.api_secret.trim()),
            }
        } else {
            Self::Signed {
                secret: Arc::from(config.api_secret.as_bytes()),
                payload: config.token_payload.clone(),
                ttl: config.token_ttl,
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> TokenMode {
        match self {
            Self::Signed { .. } => TokenMode::Signed,
            Self::Pregenerated { .. } => TokenMode::Pregenerated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    Signed,
    Pregenerated,
}

/// A usable credential plus the metadata it was issued with.
#[derive(Clone)]
pub struct Token {
    value: Arc<str>,
    pub mode: TokenMode,
    pub issued_at_unix_secs: u64,
    pub expires_at_unix_secs: Option<u64>,
    /// Claims that were signed (signed mode only).
    pub claims: Option<Map<String, Value>>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("issued_at_unix_secs", &self.issued_at_unix_secs)
            .field("expires_at_unix_secs", &self.expires_at_unix_secs)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// The raw credential, for the `Authorization` header only.
    #[must_use]
    pub fn secret_value(&self) -> &str {
        &self.value
    }
}

pub struct TokenManager {
    mode: AuthMode,
    cached: RwLock<Option<Token>>,
    refreshes: AtomicU64,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("mode", &self.mode)
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Build a manager from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] if the secret is empty or a signed token cannot be produced
    /// from the configured payload.
    pub fn new(config: &CubeConfig) -> Result<Self> {
        if config.api_secret.trim().is_empty() {
            return Err(CubeError::Config(
                "API secret (or pre-generated token) is required".to_string(),
            ));
        }
        Self::from_mode(AuthMode::infer(config))
    }

    /// # Errors
    ///
    /// Returns [`CubeError::Config`] if signing with the given mode fails.
    pub fn from_mode(mode: AuthMode) -> Result<Self> {
        let manager = Self {
            mode,
            cached: RwLock::new(None),
            refreshes: AtomicU64::new(0),
        };
        // Fail fast: a broken signing setup must surface before the first request.
        if let AuthMode::Signed { .. } = manager.mode {
            *manager.cached.write() = Some(manager.issue()?);
        }
        if let Some(exp) = manager.pregenerated_expiry()
            && exp <= now_unix_secs()
        {
            tracing::warn!(
                expires_at = exp,
                "pre-generated token is already expired; requests will likely be rejected"
            );
        }
        Ok(manager)
    }

    #[must_use]
    pub fn mode(&self) -> TokenMode {
        self.mode.kind()
    }

    /// Whether [`TokenManager::force_refresh`] can produce a different credential.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        matches!(self.mode, AuthMode::Signed { .. })
    }

    /// Number of forced refreshes performed so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Return the cached token, issuing one if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] if signing fails.
    pub fn current_token(&self) -> Result<Token> {
        if let Some(token) = self.cached.read().as_ref() {
            return Ok(token.clone());
        }

        let mut slot = self.cached.write();
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.issue()?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Discard the cached token and issue a fresh one.
    ///
    /// In pregenerated mode this hands back the same static token.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] if signing fails.
    pub fn force_refresh(&self) -> Result<Token> {
        let token = self.issue()?;
        // Two concurrent refreshes both land here; the last write wins.
        *self.cached.write() = Some(token.clone());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(mode = ?self.mode(), "token refreshed");
        Ok(token)
    }

    fn issue(&self) -> Result<Token> {
        match &self.mode {
            AuthMode::Signed {
                secret,
                payload,
                ttl,
            } => sign(secret, payload, *ttl, now_unix_secs()),
            AuthMode::Pregenerated { token } => Ok(Token {
                value: token.clone(),
                mode: TokenMode::Pregenerated,
                issued_at_unix_secs: now_unix_secs(),
                expires_at_unix_secs: self.pregenerated_expiry(),
                claims: None,
            }),
        }
    }

    fn pregenerated_expiry(&self) -> Option<u64> {
        let AuthMode::Pregenerated { token } = &self.mode else {
            return None;
        };
        unverified_exp(token)
    }
}

fn sign(secret: &[u8], payload: &Map<String, Value>, ttl: Duration, now: u64) -> Result<Token> {
    let exp = now.saturating_add(ttl.as_secs());
    let mut claims = payload.clone();
    claims.insert("iat".to_string(), Value::from(now));
    claims.insert("exp".to_string(), Value::from(exp));

    let value = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| CubeError::Config(format!("failed to sign token: {e}")))?;

    Ok(Token {
        value: Arc::from(value),
        mode: TokenMode::Signed,
        issued_at_unix_secs: now,
        expires_at_unix_secs: Some(exp),
        claims: Some(claims),
    })
}

/// Read `exp` from a JWT without verifying its signature (we don't own the key).
fn unverified_exp(token: &str) -> Option<u64> {
    let mut validation = Validation::new(jsonwebtoken::decode_header(token).ok()?.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data =
        jsonwebtoken::decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()?;
    data.claims.get("exp").and_then(Value::as_u64)
}

fn looks_like_jwt(s: &str) -> bool {
    let parts: Vec<&str> = s.trim().split('.').collect();
    parts.len() == 3
        && parts.iter().all(|p| {
            !p.is_empty()
                && p
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
