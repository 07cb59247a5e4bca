//! High-level client: token + executor + normalization for the two routes we use.

use crate::config::CubeConfig;
use crate::error::{CubeError, Result};
use crate::executor::{RequestExecutor, RetryPolicy, Route};
use crate::normalize::normalize;
use crate::query::Query;
use crate::response::RawResponse;
use crate::token::TokenManager;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CubeClient {
    executor: RequestExecutor,
}

impl CubeClient {
    /// Build a client without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] for a malformed endpoint, a missing secret or a signing
    /// setup that cannot produce tokens.
    pub fn new(config: &CubeConfig, policy: RetryPolicy) -> Result<Self> {
        let endpoint = config.validate()?;
        let tokens = Arc::new(TokenManager::new(config)?);
        info!(
            endpoint = %crate::safety::redact_url(&endpoint),
            mode = ?tokens.mode(),
            "semantic layer client configured"
        );
        Ok(Self {
            executor: RequestExecutor::new(endpoint, tokens, policy),
        })
    }

    /// Build a client and probe the `meta` route once.
    ///
    /// Credentials the remote rejects are fatal; any other probe failure is only logged so a
    /// temporarily unavailable API does not keep the server from starting.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Config`] or [`CubeError::Authentication`].
    pub async fn connect(config: &CubeConfig, policy: RetryPolicy) -> Result<Self> {
        let client = Self::new(config, policy)?;
        match client.describe().await {
            Ok(meta) => {
                let cubes = meta
                    .get("cubes")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                info!(cubes, "semantic layer metadata loaded");
            }
            Err(e @ (CubeError::Authentication(_) | CubeError::Config(_))) => return Err(e),
            Err(e) => warn!(error = %e, "initial metadata probe failed"),
        }
        Ok(client)
    }

    #[must_use]
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        self.executor.tokens()
    }

    /// Fetch the schema description (`meta` route).
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn describe(&self) -> Result<Value> {
        self.executor.execute(Route::Meta, &[]).await
    }

    /// Run a query with numeric normalization.
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn query(&self, query: &Query) -> Result<RawResponse> {
        self.query_with(query, true).await
    }

    /// Run a query, optionally skipping numeric normalization.
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub async fn query_with(&self, query: &Query, cast_numerics: bool) -> Result<RawResponse> {
        let body = self
            .executor
            .execute(Route::Load, &[("query", query.to_json())])
            .await?;
        let mut response = RawResponse::from_value(body);
        if cast_numerics {
            normalize(&mut response);
        }
        Ok(response)
    }
}
