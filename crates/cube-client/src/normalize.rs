//! Numeric coercion of result rows.
//!
//! Depending on the response mode the semantic layer serializes every value as a string. Fields
//! the annotation declares as `number` are turned back into JSON numbers: integral values become
//! integers, everything else stays a float. Values that don't parse are left untouched.

use crate::response::RawResponse;
use serde_json::{Number, Value};

/// Normalize in place. A response without `data` or without `annotation` is left unchanged.
pub fn normalize(response: &mut RawResponse) {
    let (Some(rows), Some(annotation)) = (response.data.as_mut(), response.annotation.as_ref())
    else {
        return;
    };

    let numeric = annotation.numeric_fields();
    if numeric.is_empty() {
        return;
    }

    // Non-object rows have no fields and pass through untouched.
    for row in rows.iter_mut() {
        for key in &numeric {
            if let Some(value) = row.get_mut(*key)
                && let Some(cast) = cast_numeric(value)
            {
                *value = cast;
            }
        }
    }
}

/// Copying variant of [`normalize`].
#[must_use]
pub fn normalized(mut response: RawResponse) -> RawResponse {
    normalize(&mut response);
    response
}

/// `None` means "leave the original value alone".
fn cast_numeric(value: &Value) -> Option<Value> {
    let f = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&f) {
        // Integral: keep exact integers exact instead of round-tripping them through f64.
        if let Value::Number(n) = value
            && (n.is_i64() || n.is_u64())
        {
            return Some(value.clone());
        }
        #[allow(clippy::cast_possible_truncation)]
        return Some(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(rows: Value) -> RawResponse {
        RawResponse::from_value(json!({
            "data": rows,
            "annotation": {
                "measures": {"Orders.count": {"type": "number"}},
                "dimensions": {"Orders.status": {"type": "string"}}
            }
        }))
    }

    #[test]
    fn integral_strings_become_integers() {
        let out = normalized(response(json!([{"Orders.count": "42", "Orders.status": "7"}])));
        let row = &out.data.as_ref().expect("data")[0];
        assert_eq!(row["Orders.count"], json!(42));
        assert!(row["Orders.count"].is_i64());
        // Not annotated numeric: untouched.
        assert_eq!(row["Orders.status"], json!("7"));
    }

    #[test]
    fn fractional_strings_become_floats() {
        let out = normalized(response(json!([{"Orders.count": "42.5"}])));
        assert_eq!(out.data.expect("data")[0]["Orders.count"], json!(42.5));
    }

    #[test]
    fn unparsable_and_null_values_are_left_alone() {
        let out = normalized(response(json!([
            {"Orders.count": "N/A"},
            {"Orders.count": null},
            {"Orders.count": "NaN"},
            {"Orders.status": "open"}
        ])));
        let rows = out.data.expect("data");
        assert_eq!(rows[0]["Orders.count"], json!("N/A"));
        assert_eq!(rows[1]["Orders.count"], Value::Null);
        assert_eq!(rows[2]["Orders.count"], json!("NaN"));
        assert!(rows[3].get("Orders.count").is_none());
    }

    #[test]
    fn float_that_is_integral_narrows_to_integer() {
        let out = normalized(response(json!([{"Orders.count": 3.0}, {"Orders.count": "1e3"}])));
        let rows = out.data.expect("data");
        assert_eq!(rows[0]["Orders.count"], json!(3));
        assert_eq!(rows[1]["Orders.count"], json!(1000));
    }

    #[test]
    fn non_object_rows_are_skipped_and_kept() {
        let out = normalized(response(json!([{"Orders.count": "1"}, null, "x", {"Orders.count": "2.5"}])));
        assert_eq!(
            out.data.expect("data"),
            vec![json!({"Orders.count": 1}), Value::Null, json!("x"), json!({"Orders.count": 2.5})]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalized(response(json!([
            {"Orders.count": "42"},
            {"Orders.count": "0.25"},
            {"Orders.count": "N/A"},
            {"Orders.count": 9_007_199_254_740_993_i64}
        ])));
        let twice = normalized(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            once.data.as_ref().expect("data")[3]["Orders.count"],
            json!(9_007_199_254_740_993_i64)
        );
    }

    #[test]
    fn missing_parts_disable_normalization() {
        let no_annotation = RawResponse::from_value(json!({"data": [{"Orders.count": "1"}]}));
        assert_eq!(normalized(no_annotation.clone()), no_annotation);

        let no_data = RawResponse::from_value(json!({
            "annotation": {"measures": {"Orders.count": {"type": "number"}}}
        }));
        assert_eq!(normalized(no_data.clone()), no_data);
    }
}
