use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{AggregateError, AggregateResult};
use crate::model::{record_id, AuditDef, AuditEntry, Record, RowId, ID_FIELD};
use crate::store::{SortOrder, StoreTx};

/// Append-only writer for an aggregate's remark table. There is no way
/// to change or remove an entry through it.
#[derive(Debug, Clone, Copy)]
pub struct AuditLog<'a> {
    def: &'a AuditDef,
}

impl<'a> AuditLog<'a> {
    pub fn new(def: &'a AuditDef) -> Self {
        Self { def }
    }

    pub async fn append(
        &self,
        tx: &mut dyn StoreTx,
        parent_id: RowId,
        remark: &str,
        actor: &str,
        when: DateTime<Utc>,
    ) -> AggregateResult<RowId> {
        let table = self.def.table;
        let mut row = Record::new();
        if let Some(field) = table.parent_field() {
            row.insert(field.to_string(), Value::from(parent_id));
        }
        row.insert(AuditDef::REMARK_FIELD.to_string(), Value::from(remark.trim()));
        row.insert(AuditDef::ACTOR_FIELD.to_string(), Value::from(actor));
        row.insert(
            AuditDef::TIME_FIELD.to_string(),
            Value::from(when.to_rfc3339_opts(SecondsFormat::Micros, false)),
        );

        let stored = tx
            .insert(table, &row)
            .await
            .map_err(|e| AggregateError::from_store(format!("appending to {}", table.name), e))?;

        record_id(&stored, ID_FIELD).ok_or_else(|| {
            AggregateError::from_store(
                format!("appending to {}", table.name),
                anyhow::anyhow!("stored audit row has no id").into(),
            )
        })
    }

    /// Every entry for `parent_id`, newest first
    pub async fn history(
        &self,
        tx: &mut dyn StoreTx,
        parent_id: RowId,
    ) -> AggregateResult<Vec<AuditEntry>> {
        let table = self.def.table;
        let rows = tx
            .fetch_all(table, parent_id, SortOrder::descending(AuditDef::TIME_FIELD))
            .await
            .map_err(|e| AggregateError::from_store(format!("reading {}", table.name), e))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let entry = AuditEntry::from_record(self.def, row);
                if entry.is_none() {
                    log::warn!("Skipping malformed {} row: {:?}", table.name, row);
                }
                entry
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{tables, InventorySchema};
    use crate::store::{AggregateStore, MemoryStore};
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_read_newest_first() {
        let schema = InventorySchema::assemble().unwrap();
        let store = MemoryStore::new(&schema);
        let def = AuditDef {
            table: &tables::ASSET_REMARKS,
        };
        let log = AuditLog::new(&def);

        let mut tx = store.begin().await.unwrap();
        let asset = tx
            .insert(
                &tables::ASSETS,
                json!({"assetCode": "A-1", "assetName": "Laptop"}).as_object().unwrap(),
            )
            .await
            .unwrap();
        let asset_id = record_id(&asset, "id").unwrap();

        let earlier = Utc::now() - Duration::minutes(5);
        let first = log
            .append(tx.as_mut(), asset_id, " bought ", "EMP-1", earlier)
            .await
            .unwrap();
        let second = log
            .append(tx.as_mut(), asset_id, "added RAM", "EMP-2", Utc::now())
            .await
            .unwrap();
        assert!(second > first);

        let history = log.history(tx.as_mut(), asset_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].remarks, "added RAM");
        assert_eq!(history[0].updated_by, "EMP-2");
        assert_eq!(history[1].remarks, "bought");
        assert_eq!(history[1].parent_id, asset_id);
    }
}
