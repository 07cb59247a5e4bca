//! The query pipeline as seen by the MCP layer: run, normalize, store, summarize.

use crate::client::CubeClient;
use crate::error::Result;
use crate::meta;
use crate::query::Query;
use crate::render;
use crate::store::ResourceStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Outcome of a successful `read_data` call.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub data_id: String,
    pub uri: String,
    pub rows: Arc<Value>,
    /// Compact YAML rendering for the caller.
    pub summary: String,
    /// Full JSON rendering of the same envelope.
    pub json: String,
}

#[derive(Clone)]
pub struct CubeService {
    client: Arc<CubeClient>,
    store: ResourceStore,
}

impl CubeService {
    #[must_use]
    pub fn new(client: Arc<CubeClient>, store: ResourceStore) -> Self {
        Self { client, store }
    }

    #[must_use]
    pub fn client(&self) -> &CubeClient {
        &self.client
    }

    #[must_use]
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Human-readable description of the available cubes.
    ///
    /// # Errors
    ///
    /// Propagates client failures.
    pub async fn describe_data(&self) -> Result<String> {
        let meta = self.client.describe().await?;
        Ok(render::describe_text(&meta::summarize(&meta)))
    }

    /// Execute a query and publish its rows as a resource.
    ///
    /// # Errors
    ///
    /// Propagates client failures; nothing is stored on failure.
    pub async fn read_data(&self, query: &Query) -> Result<QueryOutput> {
        let response = self.client.query(query).await?;
        let rows = Arc::new(response.rows_json());
        info!(rows = response.row_count(), "query returned rows");

        let data_id = self.store.put_shared(Arc::clone(&rows));
        info!(resource_id = %data_id, "added results as resource");

        let envelope = render::data_envelope(&data_id, &rows);
        Ok(QueryOutput {
            uri: render::resource_uri(&data_id),
            summary: render::to_yaml(&envelope),
            json: serde_json::to_string(&envelope).unwrap_or_default(),
            data_id,
            rows,
        })
    }

    /// Full JSON text of a previously stored result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CubeError::NotFound`] for unknown or expired ids.
    pub fn read_resource(&self, data_id: &str) -> Result<String> {
        let rows = self.store.get(data_id)?;
        Ok(serde_json::to_string(rows.as_ref()).unwrap_or_default())
    }
}
