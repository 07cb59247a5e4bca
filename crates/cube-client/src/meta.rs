//! Condensed view of the `meta` route, for describing the data to an LLM.

use serde::Serialize;
use serde_json::Value;

// Field order is alphabetical so the rendered YAML has sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub description: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CubeSummary {
    pub description: Option<String>,
    pub dimensions: Vec<FieldSummary>,
    pub measures: Vec<FieldSummary>,
    pub name: Option<String>,
    pub title: Option<String>,
}

/// Reduce raw metadata to cube/field names, titles and descriptions.
///
/// Entries that aren't objects are skipped; missing strings become `None`.
#[must_use]
pub fn summarize(meta: &Value) -> Vec<CubeSummary> {
    meta.get("cubes")
        .and_then(Value::as_array)
        .map(|cubes| {
            cubes
                .iter()
                .filter(|c| c.is_object())
                .map(|cube| CubeSummary {
                    description: str_field(cube, "description"),
                    dimensions: fields(cube, "dimensions"),
                    measures: fields(cube, "measures"),
                    name: str_field(cube, "name"),
                    title: str_field(cube, "title"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn fields(cube: &Value, key: &str) -> Vec<FieldSummary> {
    cube.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|f| f.is_object())
                .map(|f| FieldSummary {
                    description: str_field(f, "description"),
                    name: str_field(f, "name"),
                    title: str_field(f, "shortTitle").or_else(|| str_field(f, "title")),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarize_prefers_short_titles_and_skips_junk() {
        let meta = json!({
            "cubes": [
                {
                    "name": "Orders",
                    "title": "Orders",
                    "description": "All orders",
                    "measures": [
                        {"name": "Orders.count", "title": "Orders Count", "shortTitle": "Count", "type": "number"},
                        "junk"
                    ],
                    "dimensions": [
                        {"name": "Orders.status", "title": "Orders Status", "description": "Lifecycle state"}
                    ]
                },
                42
            ]
        });

        let summary = summarize(&meta);
        assert_eq!(summary.len(), 1);
        let orders = &summary[0];
        assert_eq!(orders.name.as_deref(), Some("Orders"));
        assert_eq!(orders.measures.len(), 1);
        assert_eq!(orders.measures[0].title.as_deref(), Some("Count"));
        assert_eq!(orders.dimensions[0].title.as_deref(), Some("Orders Status"));
        assert_eq!(
            orders.dimensions[0].description.as_deref(),
            Some("Lifecycle state")
        );
    }

    #[test]
    fn summarize_without_cubes_is_empty() {
        assert!(summarize(&json!({})).is_empty());
        assert!(summarize(&json!({"cubes": "nope"})).is_empty());
    }
}
