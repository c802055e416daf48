use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{record_id, AuditDef, Record, RowId};

/// One immutable remark row: who changed an aggregate, when, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: RowId,
    pub parent_id: RowId,
    pub remarks: String,
    pub updated_by: String,
    pub date_updated: DateTime<Utc>,
}

impl AuditEntry {
    /// Decode a stored audit row; rows missing a required column yield `None`
    pub fn from_record(audit: &AuditDef, record: &Record) -> Option<Self> {
        let parent_field = audit.table.parent_field()?;
        let text = |field: &str| match record.get(field) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        let date_updated = text(AuditDef::TIME_FIELD)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;

        Some(Self {
            id: record_id(record, "id")?,
            parent_id: record_id(record, parent_field)?,
            remarks: text(AuditDef::REMARK_FIELD)?,
            updated_by: text(AuditDef::ACTOR_FIELD)?,
            date_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tables;
    use serde_json::json;

    #[test]
    fn test_decode_stored_row() {
        let audit = AuditDef {
            table: &tables::ASSET_REMARKS,
        };
        let row = json!({
            "id": 3,
            "assetId": 9,
            "remarks": "added RAM",
            "updatedBy": "EMP-1",
            "dateUpdated": "2025-12-09T10:00:00+00:00"
        });

        let entry = AuditEntry::from_record(&audit, row.as_object().unwrap()).unwrap();
        assert_eq!(entry.id, 3);
        assert_eq!(entry.parent_id, 9);
        assert_eq!(entry.remarks, "added RAM");
        assert_eq!(entry.updated_by, "EMP-1");
        assert_eq!(entry.date_updated.to_rfc3339(), "2025-12-09T10:00:00+00:00");
    }

    #[test]
    fn test_incomplete_row_is_rejected() {
        let audit = AuditDef {
            table: &tables::BRANCH_REMARKS,
        };
        let row = json!({"id": 1, "branch_id": 2, "remarks": "x"});
        assert!(AuditEntry::from_record(&audit, row.as_object().unwrap()).is_none());
    }
}
