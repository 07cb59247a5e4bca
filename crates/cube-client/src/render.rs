//! Text renderings handed back to MCP callers.

use crate::meta::CubeSummary;
use serde::Serialize;
use serde_json::{Value, json};

pub const DESCRIPTION_PREAMBLE: &str =
    "Here is a description of the data available via the read_data tool:";

/// YAML rendering with a JSON fallback (YAML serialization of JSON values can't really fail,
/// but we never want rendering to take a result down with it).
#[must_use]
pub fn to_yaml<T: Serialize>(value: &T) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "yaml rendering failed, falling back to json");
        serde_json::to_string_pretty(value).unwrap_or_default()
    })
}

#[must_use]
pub fn describe_text(summary: &[CubeSummary]) -> String {
    format!("{DESCRIPTION_PREAMBLE}\n\n{}", to_yaml(&summary))
}

/// The envelope returned for a query: `{type: data, data_id, data}`.
#[must_use]
pub fn data_envelope(data_id: &str, rows: &Value) -> Value {
    json!({
        "type": "data",
        "data_id": data_id,
        "data": rows,
    })
}

#[must_use]
pub fn resource_uri(data_id: &str) -> String {
    format!("data://{data_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FieldSummary;

    #[test]
    fn envelope_yaml_keeps_key_order_and_native_numbers() {
        let rows = json!([{"Orders.status": "open", "Orders.count": 42, "Orders.avg": 1.5}]);
        let text = to_yaml(&data_envelope("abc", &rows));
        let type_pos = text.find("type: data").expect("type");
        let id_pos = text.find("data_id: abc").expect("data_id");
        let data_pos = text.find("data:\n").expect("data");
        assert!(type_pos < id_pos && id_pos < data_pos);
        assert!(text.contains("Orders.count: 42"));
        assert!(text.contains("Orders.avg: 1.5"));
    }

    #[test]
    fn describe_text_has_preamble_and_sorted_keys() {
        let summary = vec![CubeSummary {
            description: None,
            dimensions: vec![],
            measures: vec![FieldSummary {
                description: None,
                name: Some("Orders.count".to_string()),
                title: Some("Count".to_string()),
            }],
            name: Some("Orders".to_string()),
            title: Some("Orders".to_string()),
        }];
        let text = describe_text(&summary);
        assert!(text.starts_with(DESCRIPTION_PREAMBLE));
        let desc = text.find("description:").expect("description");
        let name = text.find("name: Orders").expect("name");
        assert!(desc < name);
    }

    #[test]
    fn resource_uri_uses_data_scheme() {
        assert_eq!(resource_uri("123"), "data://123");
    }
}
