//! Redaction helpers for anything that may end up in logs or surfaced errors.
//!
//! Tokens, secrets and row data from the semantic layer must never leak through these paths.

use serde_json::{Map, Value};
use url::Url;

const SENSITIVE_KEYS: &[&str] = &["token", "secret", "key", "password", "auth"];
const LONG_STRING_LIMIT: usize = 500;
const LONG_STRING_KEEP: usize = 200;
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment. The query carries the serialized query.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

/// Shrink a remote error message to something safe to show a caller.
#[must_use]
pub fn truncate_message(msg: &str) -> String {
    if msg.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return msg.to_string();
    }
    let head: String = msg.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    format!("{head}... [truncated]")
}

/// Produce a log-safe summary of a remote response.
///
/// Row data is replaced by a row count, sensitive top-level keys are redacted and very long
/// strings are truncated.
#[must_use]
pub fn sanitize_response_for_logging(response: &Value) -> Value {
    let Some(obj) = response.as_object() else {
        return Value::String(format!("[non-object response: {}]", json_type_name(response)));
    };

    let mut out = Map::new();
    for (k, v) in obj {
        let lowered = k.to_ascii_lowercase();
        let sanitized = if k == "data" {
            match v {
                Value::Array(rows) => Value::String(format!("[DATA REDACTED - {} rows]", rows.len())),
                Value::Null => Value::Null,
                _ => Value::String("[DATA REDACTED]".to_string()),
            }
        } else if SENSITIVE_KEYS.iter().any(|s| lowered == *s) {
            Value::String("[REDACTED]".to_string())
        } else {
            match v {
                Value::String(s) if s.chars().count() > LONG_STRING_LIMIT => {
                    let head: String = s.chars().take(LONG_STRING_KEEP).collect();
                    Value::String(format!(
                        "{head}... [TRUNCATED - original length: {}]",
                        s.chars().count()
                    ))
                }
                other => other.clone(),
            }
        };
        out.insert(k.clone(), sanitized);
    }
    Value::Object(out)
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
