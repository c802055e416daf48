use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::error::{AggregateError, AggregateResult};
use crate::model::{is_blank, value_text, ColumnDef, ColumnSource, ColumnType, Record, TableDef};

/// Whether a section is being written for the first time or merged
/// onto an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Business validation of section payloads, run before any unit of work
/// is opened.
pub struct Validator;

impl Validator {
    /// Reduce `input` to the table's declared columns with values coerced
    /// to their declared types.
    ///
    /// Absent fields stay absent on update and take the column default on
    /// create. Present-but-blank fields become `null`, or the default for
    /// columns that have one. Derived hash columns are only written when
    /// their source field carries a value.
    pub fn normalize(table: &TableDef, mode: Mode, input: &Record) -> AggregateResult<Record> {
        let mut out = Record::new();

        for column in table.columns {
            match column.source {
                ColumnSource::CreatedAt | ColumnSource::UpdatedAt => continue,
                ColumnSource::Sha256Of(source) => {
                    if let Some(raw) = input.get(source).filter(|v| !is_blank(v)) {
                        let text = value_text(raw).unwrap_or_default();
                        out.insert(column.field.to_string(), Value::String(sha256_hex(&text)));
                    }
                    continue;
                }
                ColumnSource::Payload => {}
            }

            let raw = input
                .get(column.field)
                .or_else(|| column.alias.and_then(|alias| input.get(alias)));

            let value = match raw {
                None => match (mode, column.default) {
                    (Mode::Create, Some(default)) => Value::String(default.to_string()),
                    (Mode::Create, None) if column.required => {
                        return Err(required(table, column));
                    }
                    _ => continue,
                },
                Some(value) if is_blank(value) => match column.default {
                    Some(default) => Value::String(default.to_string()),
                    None if column.required => return Err(required(table, column)),
                    None => Value::Null,
                },
                Some(value) => coerce(column, value)?,
            };
            out.insert(column.field.to_string(), value);
        }

        Ok(out)
    }

    /// Turn a normalized partial row into a full row for insertion:
    /// absent columns take their default and required columns must hold a value.
    pub fn complete(table: &TableDef, row: &mut Record) -> AggregateResult<()> {
        for column in table.columns.iter().filter(|c| !c.is_timestamp()) {
            if row.contains_key(column.field) {
                if column.required && row.get(column.field).map_or(true, is_blank) {
                    return Err(required(table, column));
                }
                continue;
            }
            match column.default {
                Some(default) => {
                    row.insert(column.field.to_string(), Value::String(default.to_string()));
                }
                None if column.required => return Err(required(table, column)),
                None => {}
            }
        }
        Ok(())
    }
}

fn required(table: &TableDef, column: &ColumnDef) -> AggregateError {
    AggregateError::validation(format!("{}.{} is required", table.name, column.field))
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn invalid(column: &ColumnDef, expected: &str) -> AggregateError {
    AggregateError::validation(format!("{} must be {}", column.field, expected))
}

fn coerce(column: &ColumnDef, value: &Value) -> AggregateResult<Value> {
    match column.ty {
        ColumnType::Text { max_len } => {
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                _ => return Err(invalid(column, "text")),
            };
            if let Some(max) = max_len {
                if text.chars().count() > max {
                    return Err(invalid(column, &format!("at most {} characters", max)));
                }
            }
            Ok(Value::String(text))
        }
        ColumnType::Phone => match value {
            Value::String(s) if is_phone(s.trim()) => Ok(Value::String(s.trim().to_string())),
            _ => Err(invalid(column, "a valid phone number")),
        },
        ColumnType::Integer => {
            let parsed = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| invalid(column, "an integer"))
        }
        ColumnType::Decimal => {
            let parsed = match value {
                Value::Number(n) => Some(n.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64),
                _ => None,
            };
            parsed
                .map(Value::Number)
                .ok_or_else(|| invalid(column, "a number"))
        }
        ColumnType::Date => value
            .as_str()
            .and_then(|s| parse_date(s.trim()))
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| invalid(column, "a date (YYYY-MM-DD)")),
        ColumnType::DateTime => value
            .as_str()
            .and_then(|s| parse_datetime(s.trim()))
            .map(|at| Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, false)))
            .ok_or_else(|| invalid(column, "a date or RFC 3339 timestamp")),
        ColumnType::Enum(variants) => match value.as_str().map(str::trim) {
            Some(s) if variants.contains(&s) => Ok(Value::String(s.to_string())),
            _ => Err(invalid(
                column,
                &format!("one of: {}", variants.join(", ")),
            )),
        },
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|at| at.date_naive()))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|at| at.with_timezone(&Utc))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// North American style numbers with an optional country prefix, as
/// accepted by the inventory front end
static PHONE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$").ok()
});

fn is_phone(s: &str) -> bool {
    PHONE_PATTERN
        .as_ref()
        .map_or(false, |pattern| pattern.is_match(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tables;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_create_fills_defaults_and_requires_fields() {
        let out = Validator::normalize(
            &tables::ASSETS,
            Mode::Create,
            &record(json!({"assetCode": " A-1 ", "assetName": "Laptop", "bogus": 1})),
        )
        .unwrap();

        assert_eq!(out["assetCode"], json!("A-1"));
        assert_eq!(out["status"], json!("Active"));
        assert_eq!(out["assetCondition"], json!("Good"));
        assert!(!out.contains_key("bogus"));
        assert!(!out.contains_key("brand"));
        assert!(!out.contains_key("createdAt"));

        let err = Validator::normalize(
            &tables::ASSETS,
            Mode::Create,
            &record(json!({"assetName": "Laptop"})),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "assets.assetCode is required");
    }

    #[test]
    fn test_update_keeps_absent_fields_absent_and_clears_blank_ones() {
        let out = Validator::normalize(
            &tables::ASSET_TECHNICAL,
            Mode::Update,
            &record(json!({"ram": "", "os": null, "cpu": "i7"})),
        )
        .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out["ram"], Value::Null);
        assert_eq!(out["os"], Value::Null);
        assert_eq!(out["cpu"], json!("i7"));
    }

    #[test]
    fn test_required_fields_cannot_be_cleared() {
        let err = Validator::normalize(
            &tables::BRANCHES,
            Mode::Update,
            &record(json!({"name": "  "})),
        )
        .unwrap_err();
        assert!(matches!(err, AggregateError::ValidationFailed(_)));
    }

    #[test]
    fn test_type_coercion() {
        let out = Validator::normalize(
            &tables::ASSET_COMMERCIAL,
            Mode::Update,
            &record(json!({"amount": "1200.50", "amcExp": "2026-03-01T10:00:00Z"})),
        )
        .unwrap();
        assert_eq!(out["amount"], json!(1200.5));
        assert_eq!(out["amcExp"], json!("2026-03-01"));

        let out = Validator::normalize(
            &tables::BRANCH_INFRA,
            Mode::Update,
            &record(json!({"total_staff": "12"})),
        )
        .unwrap();
        assert_eq!(out["total_staff"], json!(12));

        for bad in [
            json!({"total_staff": "twelve"}),
            json!({"total_staff": 1.5}),
            json!({"ups_purchase_year": true}),
        ] {
            assert!(Validator::normalize(&tables::BRANCH_INFRA, Mode::Update, &record(bad)).is_err());
        }
    }

    #[test]
    fn test_enum_and_length_limits() {
        let err = Validator::normalize(
            &tables::ASSETS,
            Mode::Update,
            &record(json!({"status": "Lost"})),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "status must be one of: Active, Repair, Disposed");

        let err = Validator::normalize(
            &tables::ASSETS,
            Mode::Update,
            &record(json!({"groupId": "AB"})),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "groupId must be at most 1 characters");
    }

    #[test]
    fn test_license_key_is_hashed_and_never_stored() {
        let out = Validator::normalize(
            &tables::ASSET_LICENSE,
            Mode::Create,
            &record(json!({"licenseKey": "ABC-123", "notes": "volume"})),
        )
        .unwrap();

        assert_eq!(out["licenseKeyHash"], json!(sha256_hex("ABC-123")));
        assert_eq!(out["licenseNotes"], json!("volume"));
        assert!(!out.contains_key("licenseKey"));
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let out = Validator::normalize(
            &tables::ASSET_LICENSE,
            Mode::Update,
            &record(json!({"licenseKey": "", "noOfLicenses": 5})),
        )
        .unwrap();
        assert!(!out.contains_key("licenseKeyHash"));
    }

    #[test]
    fn test_complete_fills_defaults_for_late_inserts() {
        let mut row = Validator::normalize(
            &tables::BRANCH_PRINTERS,
            Mode::Update,
            &record(json!({"printer_name": "HP"})),
        )
        .unwrap();
        Validator::complete(&tables::BRANCH_PRINTERS, &mut row).unwrap();
        assert_eq!(row["printer_type"], json!("USB"));
        assert_eq!(row["printer_status"], json!("Active"));

        let mut row = Record::new();
        assert!(Validator::complete(&tables::BRANCHES, &mut row).is_err());
    }

    #[test]
    fn test_phone_numbers() {
        for ok in ["555-123-4567", "(555) 123 4567", "+977123456789", "555.123.45678"] {
            assert!(is_phone(ok), "{} should be accepted", ok);
        }
        for bad in ["12345", "555-123-456", "phone", "555-123-4567-89"] {
            assert!(!is_phone(bad), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_phone_pattern_compiles() {
        assert!(PHONE_PATTERN.is_some());
    }

    #[test]
    fn test_phone_accepts_any_whitespace_separator() {
        for ok in ["123\t456\t7890", "123\n456 7890", "(123)\u{a0}456\t78901"] {
            assert!(is_phone(ok), "{:?} should be accepted", ok);
        }
        for bad in ["123\t\t456\t7890", "123 456  7890", "123_456_7890"] {
            assert!(!is_phone(bad), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_phone_column_keeps_inner_whitespace() {
        let column = tables::BRANCHES.column("contact").unwrap();
        assert_eq!(
            coerce(column, &json!(" 123\t456\t7890 ")).unwrap(),
            json!("123\t456\t7890")
        );
        assert!(coerce(column, &json!("123_456_7890")).is_err());
    }
}
