//! Client core for the Cube semantic-layer MCP server.
//!
//! Owns everything with state or failure handling:
//! - token lifecycle (`token`)
//! - resilient request execution (`executor`)
//! - numeric normalization of result rows (`normalize`)
//! - short-lived result storage (`store`)
//!
//! It contains **no** MCP protocol code; `cube-mcp-server` is the thin dispatcher on top.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod meta;
pub mod normalize;
pub mod query;
pub mod render;
pub mod response;
pub mod safety;
pub mod service;
pub mod store;
pub mod token;

pub use client::CubeClient;
pub use config::CubeConfig;
pub use error::{CubeError, ErrorKind, Result};
pub use executor::{RequestExecutor, RetryPolicy, Route};
pub use query::Query;
pub use response::RawResponse;
pub use service::{CubeService, QueryOutput};
pub use store::{ResourceStore, RetentionPolicy};
pub use token::{TokenManager, TokenMode};
