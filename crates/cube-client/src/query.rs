//! The query shape accepted by the `load` route.
//!
//! Field-level validation is done by whoever deserializes this (the MCP tool schema); the core
//! only serializes it and never mutates a caller-supplied value.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

pub const DEFAULT_LIMIT: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// Either an absolute `[from, to]` pair of ISO dates or a relative phrase like `last 7 days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateRange {
    Absolute([String; 2]),
    Relative(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDimension {
    pub dimension: String,
    pub granularity: Granularity,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub time_dimensions: Vec<TimeDimension>,
    /// Reserved. Passed through untouched when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Value>>,
    /// Key order is significant.
    #[serde(default)]
    pub order: OrderMap,
    #[serde(default = "default_limit", skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default = "default_offset", skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default)]
    pub ungrouped: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            measures: Vec::new(),
            dimensions: Vec::new(),
            time_dimensions: Vec::new(),
            filters: None,
            order: OrderMap::default(),
            limit: default_limit(),
            offset: default_offset(),
            ungrouped: false,
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_limit() -> Option<u64> {
    Some(DEFAULT_LIMIT)
}

#[allow(clippy::unnecessary_wraps)]
fn default_offset() -> Option<u64> {
    Some(0)
}

/// Ordered `field -> direction` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderMap(pub Vec<(String, OrderDirection)>);

impl OrderMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for OrderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, dir) in &self.0 {
            map.serialize_entry(field, dir)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderVisitor;

        impl<'de> Visitor<'de> for OrderVisitor {
            type Value = OrderMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to \"asc\" or \"desc\"")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OrderMap, A::Error> {
                let mut out: Vec<(String, OrderDirection)> = Vec::new();
                while let Some((field, dir)) = access.next_entry::<String, OrderDirection>()? {
                    out.retain(|(f, _)| *f != field);
                    out.push((field, dir));
                }
                Ok(OrderMap(out))
            }
        }

        deserializer.deserialize_map(OrderVisitor)
    }
}

impl Query {
    /// Serialize to the JSON object the remote API expects.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
