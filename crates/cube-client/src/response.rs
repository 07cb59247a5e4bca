//! Typed view of a `load` response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAnnotation {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Everything else the remote API says about the field (title, format, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldAnnotation {
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.field_type.as_deref() == Some("number")
    }
}

/// Per-field schema info returned next to the rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default)]
    pub measures: Map<String, Value>,
    #[serde(default)]
    pub dimensions: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub segments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub time_dimensions: Map<String, Value>,
}

impl Annotation {
    /// Fields declared numeric in `measures` or `dimensions`.
    ///
    /// Entries that don't parse as a field annotation are ignored.
    #[must_use]
    pub fn numeric_fields(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .chain(self.measures.iter())
            .filter(|(_, v)| {
                serde_json::from_value::<FieldAnnotation>((*v).clone())
                    .is_ok_and(|a| a.is_numeric())
            })
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// The remote service's reply. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Result rows as received. Rows are normally objects; anything else is kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
    /// Remaining top-level fields (`query`, `lastRefreshTime`, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawResponse {
    /// Interpret a JSON body. Parts that don't fit (`data` not being an array, a malformed
    /// annotation) degrade to "absent" rather than failing. Individual odd rows are kept.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return Self::default();
        };

        let data = match obj.remove("data") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        };
        let annotation = obj
            .remove("annotation")
            .and_then(|a| serde_json::from_value::<Annotation>(a).ok());

        Self {
            data,
            annotation,
            extra: obj,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// The rows as a JSON array (empty when absent).
    #[must_use]
    pub fn rows_json(&self) -> Value {
        Value::Array(self.data.clone().unwrap_or_default())
    }
}
