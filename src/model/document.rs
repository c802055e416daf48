use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{AuditEntry, ChildKind, Record};

/// One parent row with every declared child, as returned by a read.
///
/// Serializes flat: the parent's fields at the top level, each populated
/// 1:1 child under its section label (the key is absent otherwise), each
/// referenced lookup row under its label, each 1:N collection as an array
/// and the audit history as `remarks`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedDocument {
    #[serde(flatten)]
    pub parent: Record,
    #[serde(flatten)]
    pub singular: BTreeMap<&'static str, Record>,
    #[serde(flatten)]
    pub lookups: BTreeMap<&'static str, Record>,
    #[serde(flatten)]
    pub collections: BTreeMap<&'static str, Vec<Record>>,
    /// Newest first
    pub remarks: Vec<AuditEntry>,
}

impl ComposedDocument {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.parent.get(name)
    }

    /// The 1:1 child of this kind, if present
    pub fn child(&self, kind: ChildKind) -> Option<&Record> {
        self.singular.get(kind.label())
    }

    /// Lookup row embedded under `label`, if the parent references one
    pub fn lookup(&self, label: &str) -> Option<&Record> {
        self.lookups.get(label)
    }

    /// Rows of a 1:N collection; empty when the kind is not a collection
    pub fn rows(&self, kind: ChildKind) -> &[Record] {
        self.collections
            .get(kind.label())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Result of a committed update: the parent row as it now stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub parent: Record,
    pub audit_entry_id: crate::model::RowId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_flat_and_omits_absent_children() {
        let mut singular = BTreeMap::new();
        singular.insert(
            "technical",
            json!({"assetId": 1, "cpu": "i5"}).as_object().unwrap().clone(),
        );

        let doc = ComposedDocument {
            parent: json!({"id": 1, "assetCode": "A-1"}).as_object().unwrap().clone(),
            singular,
            lookups: BTreeMap::new(),
            collections: BTreeMap::new(),
            remarks: Vec::new(),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["assetCode"], json!("A-1"));
        assert_eq!(value["technical"]["cpu"], json!("i5"));
        assert!(value.get("commercial").is_none());
        assert!(value.get("license").is_none());
        assert_eq!(value["remarks"], json!([]));

        assert_eq!(doc.child(ChildKind::Technical).unwrap()["cpu"], json!("i5"));
        assert!(doc.child(ChildKind::Commercial).is_none());
        assert!(doc.rows(ChildKind::Scanner).is_empty());
    }
}
