//! MCP surface: two tools and two resource kinds on top of [`CubeService`].
//!
//! The dispatch logic lives in inherent methods so it can be driven without a transport; the
//! [`ServerHandler`] impl only adapts signatures.

use cube_mcp_client::{CubeError, CubeService, Query, render};
use rmcp::model::{
    Annotated, CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, RawResource,
    ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

pub const DESCRIBE_DATA: &str = "describe_data";
pub const READ_DATA: &str = "read_data";
pub const DESCRIPTION_URI: &str = "context://data_description";
const DATA_URI_PREFIX: &str = "data://";

const INSTRUCTIONS: &str = "Query a Cube semantic layer. Call describe_data first to learn the \
available cubes, measures and dimensions, then read_data with a query. Full results stay \
available as data://{data_id} resources.";

#[derive(Clone)]
pub struct CubeMcpServer {
    service: CubeService,
}

impl CubeMcpServer {
    #[must_use]
    pub fn new(service: CubeService) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &CubeService {
        &self.service
    }

    #[must_use]
    pub fn tools() -> Vec<Tool> {
        vec![
            Tool::new(
                DESCRIBE_DATA,
                "Describe the data available in Cube.",
                Arc::new(schema_object(json!({"type": "object", "properties": {}}))),
            ),
            Tool::new(
                READ_DATA,
                "Read data from Cube.",
                Arc::new(schema_object(read_data_schema())),
            ),
        ]
    }

    /// Dispatch a tool call.
    ///
    /// Pipeline failures come back as an error *result* (`is_error`), so the calling model can
    /// read the message; only protocol misuse is a JSON-RPC error.
    ///
    /// # Errors
    ///
    /// Unknown tool names and malformed `read_data` arguments.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        match name {
            DESCRIBE_DATA => Ok(match self.service.describe_data().await {
                Ok(text) => CallToolResult::success(vec![Content::text(text)]),
                Err(e) => tool_error(DESCRIBE_DATA, &e),
            }),
            READ_DATA => {
                let query = parse_query(arguments)?;
                info!(
                    measures = query.measures.len(),
                    dimensions = query.dimensions.len(),
                    time_dimensions = query.time_dimensions.len(),
                    limit = ?query.limit,
                    "read_data called"
                );
                Ok(match self.service.read_data(&query).await {
                    Ok(out) => CallToolResult::success(vec![
                        Content::text(out.summary),
                        Content::resource(ResourceContents::text(out.json, out.uri)),
                    ]),
                    Err(e) => tool_error(READ_DATA, &e),
                })
            }
            other => Err(ErrorData::invalid_params(
                format!("unknown tool: {other}"),
                None,
            )),
        }
    }

    /// The description resource plus every retained query result, newest first.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        let mut description = RawResource::new(DESCRIPTION_URI, "data_description");
        description.description = Some("Describe the data available in Cube.".to_string());
        description.mime_type = Some("text/plain".to_string());

        let mut out = vec![Annotated::new(description, None)];
        for (id, created_at) in self.service.store().list() {
            let mut raw = RawResource::new(render::resource_uri(&id), id);
            raw.description = Some(format!("Query result from {}", created_at.to_rfc3339()));
            raw.mime_type = Some("application/json".to_string());
            out.push(Annotated::new(raw, None));
        }
        out
    }

    /// # Errors
    ///
    /// `resource_not_found` for unknown URIs and unknown or expired result ids; an internal
    /// error if the description cannot be fetched.
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let text = if uri == DESCRIPTION_URI {
            self.service.describe_data().await.map_err(|e| {
                error!(error = %e, kind = e.kind().as_str(), "data description unavailable");
                to_error_data(&e)
            })?
        } else if let Some(id) = uri.strip_prefix(DATA_URI_PREFIX) {
            self.service.read_resource(id).map_err(|e| to_error_data(&e))?
        } else {
            return Err(ErrorData::resource_not_found(
                format!("unknown resource: {uri}"),
                Some(json!({ "uri": uri })),
            ));
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }
}

impl ServerHandler for CubeMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = Implementation::from_build_env();
        implementation.name = env!("CARGO_PKG_NAME").to_string();
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .build();
        info.server_info = implementation;
        info.instructions = Some(INSTRUCTIONS.to_string());
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(Self::tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(&request.name, request.arguments).await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult::with_all_items(self.resources()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read(&request.uri).await
    }
}

fn parse_query(arguments: Option<JsonObject>) -> Result<Query, ErrorData> {
    let raw = arguments
        .and_then(|mut args| args.remove("query"))
        .ok_or_else(|| ErrorData::invalid_params("missing required argument 'query'", None))?;
    serde_json::from_value(raw)
        .map_err(|e| ErrorData::invalid_params(format!("invalid query: {e}"), None))
}

fn tool_error(tool: &str, e: &CubeError) -> CallToolResult {
    error!(tool, error = %e, kind = e.kind().as_str(), "tool call failed");
    CallToolResult::error(vec![Content::text(format!("Error: {e}"))])
}

fn to_error_data(e: &CubeError) -> ErrorData {
    let data = Some(json!({ "kind": e.kind().as_str() }));
    match e {
        CubeError::NotFound(_) => ErrorData::resource_not_found(e.to_string(), data),
        _ => ErrorData::internal_error(e.to_string(), data),
    }
}

fn schema_object(v: Value) -> JsonObject {
    match v {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn read_data_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "object",
                "properties": {
                    "measures": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Names of measures to query"
                    },
                    "dimensions": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Names of dimensions to group by"
                    },
                    "timeDimensions": {
                        "type": "array",
                        "description": "Time dimensions to group by",
                        "items": {
                            "type": "object",
                            "properties": {
                                "dimension": {
                                    "type": "string",
                                    "description": "Name of the time dimension"
                                },
                                "granularity": {
                                    "type": "string",
                                    "enum": ["second", "minute", "hour", "day", "week", "month", "quarter", "year"],
                                    "description": "Time granularity"
                                },
                                "dateRange": {
                                    "anyOf": [
                                        {"type": "array", "items": {"type": "string"}, "minItems": 2, "maxItems": 2},
                                        {"type": "string"}
                                    ],
                                    "description": "Pair of ISO dates for the start and end of the range, or a relative range such as 'last 7 days', 'today', 'yesterday', 'last year'"
                                }
                            },
                            "required": ["dimension", "granularity", "dateRange"]
                        }
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "default": 500,
                        "description": "Maximum number of rows to return. Defaults to 500"
                    },
                    "offset": {
                        "type": "integer",
                        "minimum": 0,
                        "default": 0,
                        "description": "Number of rows to skip. Defaults to 0"
                    },
                    "order": {
                        "type": "object",
                        "additionalProperties": {"type": "string", "enum": ["asc", "desc"]},
                        "description": "Optional ordering of the results. The order is sensitive to the order of keys."
                    },
                    "ungrouped": {
                        "type": "boolean",
                        "default": false,
                        "description": "Return results without grouping by dimensions. Useful for fetching a single row by its ID."
                    }
                }
            }
        },
        "required": ["query"]
    })
}
