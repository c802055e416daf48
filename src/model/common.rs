use serde_json::{Map, Value};

/// Identifier of any serial-keyed row (parents, device rows, audit entries).
pub type RowId = i64;

/// A row or a partial row, keyed by wire field name.
pub type Record = Map<String, Value>;

/// Read a row identifier out of a record field
pub fn record_id(record: &Record, field: &str) -> Option<RowId> {
    match record.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// True for `null` and for strings that are empty after trimming
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Text form of a scalar value; `None` for null
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_accepts_numbers_and_numeric_strings() {
        let record = json!({"id": 7, "assetId": "12", "name": "x"});
        let record = record.as_object().unwrap();

        assert_eq!(record_id(record, "id"), Some(7));
        assert_eq!(record_id(record, "assetId"), Some(12));
        assert_eq!(record_id(record, "name"), None);
        assert_eq!(record_id(record, "missing"), None);
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("   ")));
        assert!(!is_blank(&json!("x")));
        assert!(!is_blank(&json!(0)));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("a")), Some("a".to_string()));
        assert_eq!(value_text(&json!(12.5)), Some("12.5".to_string()));
        assert_eq!(value_text(&json!(true)), Some("true".to_string()));
        assert_eq!(value_text(&Value::Null), None);
    }
}
