use polars::prelude::AnyValue;
use serde_json::Value;

/// Text form of a parsed cell: null becomes "", structured values become compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(boolean) => boolean.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Text form of a stored columnar cell; `None` means the row never had the field.
pub fn anyvalue_to_text(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::Boolean(v) => Some(v.to_string()),
        AnyValue::Int8(v) => Some(v.to_string()),
        AnyValue::Int16(v) => Some(v.to_string()),
        AnyValue::Int32(v) => Some(v.to_string()),
        AnyValue::Int64(v) => Some(v.to_string()),
        AnyValue::UInt8(v) => Some(v.to_string()),
        AnyValue::UInt16(v) => Some(v.to_string()),
        AnyValue::UInt32(v) => Some(v.to_string()),
        AnyValue::UInt64(v) => Some(v.to_string()),
        AnyValue::Float32(v) => Some(f64::from(*v).to_string()),
        AnyValue::Float64(v) => Some(v.to_string()),
        AnyValue::String(v) => Some(v.to_string()),
        AnyValue::StringOwned(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_text() {
        assert_eq!(value_to_text(&Value::Null), "");
        assert_eq!(value_to_text(&json!("  padded ")), "  padded ");
        assert_eq!(value_to_text(&json!(42)), "42");
        assert_eq!(value_to_text(&json!(1.5)), "1.5");
        assert_eq!(value_to_text(&json!(false)), "false");
    }

    #[test]
    fn structured_values_become_json_text() {
        assert_eq!(value_to_text(&json!([1, "a"])), r#"[1,"a"]"#);
        assert_eq!(value_to_text(&json!({"k": null})), r#"{"k":null}"#);
    }

    #[test]
    fn null_cells_are_absent() {
        assert_eq!(anyvalue_to_text(&AnyValue::Null), None);
        assert_eq!(anyvalue_to_text(&AnyValue::String("x")), Some("x".to_string()));
        assert_eq!(anyvalue_to_text(&AnyValue::Int64(7)), Some("7".to_string()));
    }
}
