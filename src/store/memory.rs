//! In-process backend with the same transactional contract as Postgres.
//!
//! Each unit of work takes an exclusive lock on the whole state and
//! operates on a private copy, which replaces the shared state only on
//! commit. Dropping a unit of work discards the copy.

use anyhow::anyhow;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::{
    record_id, value_text, ColumnSource, InventorySchema, Record, RowId, TableDef, TableKey, ID_FIELD,
};
use crate::store::traits::{
    AggregateStore, ListQuery, RowKey, SortOrder, StoreError, StoreResult, StoreTx,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<&'static str, BTreeMap<RowId, Record>>,
    sequences: HashMap<&'static str, RowId>,
}

/// (child table, parent field) pairs referencing a table
type References = HashMap<&'static str, Vec<(&'static str, &'static str)>>;

/// (field, looked-up table) pairs declared on a table
type Lookups = HashMap<&'static str, Vec<(&'static str, &'static str)>>;

#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
    references: Arc<References>,
    lookups: Arc<Lookups>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new(schema: &InventorySchema) -> Self {
        let mut references: References = HashMap::new();
        for table in schema.tables() {
            if let Some(parent) = table.parent {
                references
                    .entry(parent.table)
                    .or_default()
                    .push((table.name, parent.field));
            }
        }

        let mut lookups: Lookups = HashMap::new();
        for aggregate in schema.aggregates() {
            for lookup in &aggregate.lookups {
                references
                    .entry(lookup.table.name)
                    .or_default()
                    .push((aggregate.parent.name, lookup.field));
                lookups
                    .entry(aggregate.parent.name)
                    .or_default()
                    .push((lookup.field, lookup.table.name));
            }
        }

        Self {
            state: Arc::new(AsyncMutex::new(MemoryState::default())),
            references: Arc::new(references),
            lookups: Arc::new(lookups),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every subsequent insert, update or delete on `table` fail
    pub fn fail_writes_to(&self, table: &str) {
        self.failing.lock().insert(table.to_string());
    }

    pub fn clear_faults(&self) {
        self.failing.lock().clear();
    }

    /// Committed row count of a table
    pub async fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait::async_trait]
impl AggregateStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            references: self.references.clone(),
            lookups: self.lookups.clone(),
            failing: self.failing.clone(),
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    references: Arc<References>,
    lookups: Arc<Lookups>,
    failing: Arc<Mutex<HashSet<String>>>,
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn belongs_to(table: &TableDef, row: &Record, parent: RowId) -> bool {
    table
        .parent_field()
        .map_or(false, |field| record_id(row, field) == Some(parent))
}

impl MemoryTx {
    fn check_fault(&self, table: &TableDef) -> StoreResult<()> {
        if self.failing.lock().contains(table.name) {
            return Err(StoreError::Backend(anyhow!(
                "injected write failure on {}",
                table.name
            )));
        }
        Ok(())
    }

    fn rows(&self, table: &TableDef) -> Option<&BTreeMap<RowId, Record>> {
        self.working.tables.get(table.name)
    }

    fn matching(&self, table: &TableDef, key: RowKey) -> Vec<RowId> {
        let Some(rows) = self.rows(table) else {
            return Vec::new();
        };
        match key {
            RowKey::Id(id) => rows.contains_key(&id).then_some(id).into_iter().collect(),
            RowKey::Parent(parent) => rows
                .iter()
                .filter(|(_, row)| belongs_to(table, row, parent))
                .map(|(id, _)| *id)
                .collect(),
            RowKey::Scoped { id, parent } => rows
                .get(&id)
                .filter(|row| belongs_to(table, row, parent))
                .map(|_| id)
                .into_iter()
                .collect(),
        }
    }

    fn check_unique(&self, table: &TableDef, own_key: Option<RowId>, row: &Record) -> StoreResult<()> {
        let Some(rows) = self.rows(table) else {
            return Ok(());
        };
        for field in table.unique {
            let Some(value) = row.get(*field).and_then(value_text) else {
                continue;
            };
            let clash = rows.iter().any(|(key, other)| {
                Some(*key) != own_key && other.get(*field).and_then(value_text).as_ref() == Some(&value)
            });
            if clash {
                return Err(StoreError::UniqueViolation(format!(
                    "{} '{}' already exists",
                    field, value
                )));
            }
        }
        Ok(())
    }

    fn check_parent_exists(&self, table: &TableDef, values: &Record) -> StoreResult<Option<RowId>> {
        let Some(parent) = table.parent else {
            return Ok(None);
        };
        let Some(parent_id) = record_id(values, parent.field) else {
            return Err(StoreError::ReferenceViolation(format!(
                "{}.{} must not be null",
                table.name, parent.column
            )));
        };
        let exists = self
            .working
            .tables
            .get(parent.table)
            .map_or(false, |rows| rows.contains_key(&parent_id));
        if !exists {
            return Err(StoreError::ReferenceViolation(format!(
                "{} references missing {} row {}",
                table.name, parent.table, parent_id
            )));
        }
        Ok(Some(parent_id))
    }

    fn check_lookups(&self, table: &TableDef, row: &Record) -> StoreResult<()> {
        let Some(lookups) = self.lookups.get(table.name) else {
            return Ok(());
        };
        for (field, target) in lookups {
            let Some(id) = record_id(row, field) else {
                continue;
            };
            let exists = self
                .working
                .tables
                .get(target)
                .map_or(false, |rows| rows.contains_key(&id));
            if !exists {
                return Err(StoreError::ReferenceViolation(format!(
                    "{}.{} references missing {} row {}",
                    table.name, field, target, id
                )));
            }
        }
        Ok(())
    }

    fn check_not_referenced(&self, table: &TableDef, id: RowId) -> StoreResult<()> {
        let Some(children) = self.references.get(table.name) else {
            return Ok(());
        };
        for (child_table, field) in children {
            let referenced = self
                .working
                .tables
                .get(child_table)
                .map_or(false, |rows| rows.values().any(|row| record_id(row, field) == Some(id)));
            if referenced {
                return Err(StoreError::ReferenceViolation(format!(
                    "{} row {} is still referenced from {}",
                    table.name, id, child_table
                )));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreTx for MemoryTx {
    async fn fetch(&mut self, table: &TableDef, key: RowKey) -> StoreResult<Option<Record>> {
        let found = self.matching(table, key).into_iter().next();
        Ok(found.and_then(|id| self.rows(table)?.get(&id).cloned()))
    }

    async fn fetch_all(
        &mut self,
        table: &TableDef,
        parent: RowId,
        order: SortOrder,
    ) -> StoreResult<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .rows(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| belongs_to(table, row, parent))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            let ord = compare(a.get(order.field), b.get(order.field))
                .then_with(|| compare(a.get(ID_FIELD), b.get(ID_FIELD)));
            if order.descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(rows)
    }

    async fn insert(&mut self, table: &TableDef, values: &Record) -> StoreResult<Record> {
        self.check_fault(table)?;
        let parent_id = self.check_parent_exists(table, values)?;

        let mut row = Record::new();
        let key = match table.key {
            TableKey::Serial => {
                let seq = self.working.sequences.entry(table.name).or_insert(0);
                *seq += 1;
                row.insert(ID_FIELD.to_string(), Value::from(*seq));
                *seq
            }
            TableKey::Parent => {
                let id = parent_id.ok_or_else(|| {
                    StoreError::Backend(anyhow!("{} is keyed by a missing parent", table.name))
                })?;
                if self.rows(table).map_or(false, |rows| rows.contains_key(&id)) {
                    return Err(StoreError::UniqueViolation(format!(
                        "{} already has a row for {}",
                        table.name, id
                    )));
                }
                id
            }
        };

        if let (Some(parent), Some(id)) = (table.parent, parent_id) {
            row.insert(parent.field.to_string(), Value::from(id));
        }
        for column in table.columns {
            let value = if column.is_timestamp() {
                now()
            } else {
                values.get(column.field).cloned().unwrap_or(Value::Null)
            };
            row.insert(column.field.to_string(), value);
        }

        self.check_unique(table, None, &row)?;
        self.check_lookups(table, &row)?;
        self.working
            .tables
            .entry(table.name)
            .or_default()
            .insert(key, row.clone());
        Ok(row)
    }

    async fn update(
        &mut self,
        table: &TableDef,
        key: RowKey,
        changes: &Record,
    ) -> StoreResult<Option<Record>> {
        self.check_fault(table)?;
        let Some(id) = self.matching(table, key).into_iter().next() else {
            return Ok(None);
        };
        let Some(mut row) = self.rows(table).and_then(|rows| rows.get(&id)).cloned() else {
            return Ok(None);
        };

        for column in table.columns {
            if matches!(column.source, ColumnSource::UpdatedAt) {
                row.insert(column.field.to_string(), now());
            } else if column.is_timestamp() {
                continue;
            } else if let Some(value) = changes.get(column.field) {
                row.insert(column.field.to_string(), value.clone());
            }
        }

        self.check_unique(table, Some(id), &row)?;
        self.check_lookups(table, &row)?;
        self.working
            .tables
            .entry(table.name)
            .or_default()
            .insert(id, row.clone());
        Ok(Some(row))
    }

    async fn delete(&mut self, table: &TableDef, key: RowKey) -> StoreResult<u64> {
        self.check_fault(table)?;
        let ids = self.matching(table, key);
        for id in &ids {
            self.check_not_referenced(table, *id)?;
        }
        if let Some(rows) = self.working.tables.get_mut(table.name) {
            for id in &ids {
                rows.remove(id);
            }
        }
        Ok(ids.len() as u64)
    }

    async fn list(&mut self, table: &TableDef, query: &ListQuery) -> StoreResult<(Vec<Record>, u64)> {
        let matches: Vec<&Record> = self
            .rows(table)
            .map(|rows| rows.values().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| row.get(*field).and_then(value_text).as_ref() == Some(value))
            })
            .filter(|row| match &query.search {
                None => true,
                Some((fields, term)) => {
                    let term = term.to_lowercase();
                    fields.iter().any(|field| {
                        row.get(*field)
                            .and_then(value_text)
                            .map_or(false, |text| text.to_lowercase().contains(&term))
                    })
                }
            })
            .collect();

        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tables;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn store() -> MemoryStore {
        MemoryStore::new(&InventorySchema::assemble().unwrap())
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded() {
        let store = store();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .unwrap();
        drop(tx);
        assert_eq!(store.row_count("assets").await, 0);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.row_count("assets").await, 1);
    }

    #[tokio::test]
    async fn test_unique_fields_are_enforced() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .unwrap();

        let err = tx
            .insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "y"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_references_restrict_deletes() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let asset = tx
            .insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .unwrap();
        let id = record_id(&asset, "id").unwrap();

        tx.insert(&tables::ASSET_TECHNICAL, &record(json!({"assetId": id, "cpu": "i5"})))
            .await
            .unwrap();

        let err = tx.delete(&tables::ASSETS, RowKey::Id(id)).await.unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation(_)));

        assert_eq!(tx.delete(&tables::ASSET_TECHNICAL, RowKey::Parent(id)).await.unwrap(), 1);
        assert_eq!(tx.delete(&tables::ASSETS, RowKey::Id(id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_service_station_references_are_enforced() {
        let store = store();
        let mut tx = store.begin().await.unwrap();

        let err = tx
            .insert(&tables::BRANCHES, &record(json!({"name": "Dharan", "service_station_id": 7})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation(_)));

        tx.insert(&tables::SERVICE_STATIONS, &record(json!({"name": "East Hub"})))
            .await
            .unwrap();
        let branch = tx
            .insert(&tables::BRANCHES, &record(json!({"name": "Dharan", "service_station_id": 1})))
            .await
            .unwrap();
        let branch_id = record_id(&branch, "id").unwrap();

        let err = tx
            .update(&tables::BRANCHES, RowKey::Id(branch_id), &record(json!({"service_station_id": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation(_)));

        let err = tx.delete(&tables::SERVICE_STATIONS, RowKey::Id(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation(_)));

        tx.update(&tables::BRANCHES, RowKey::Id(branch_id), &record(json!({"service_station_id": null})))
            .await
            .unwrap();
        assert_eq!(tx.delete(&tables::SERVICE_STATIONS, RowKey::Id(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_child_insert_requires_existing_parent() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert(&tables::BRANCH_PRINTERS, &record(json!({"branch_id": 99})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation(_)));
    }

    #[tokio::test]
    async fn test_scoped_key_checks_parent() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let a = tx
            .insert(&tables::BRANCHES, &record(json!({"name": "A"})))
            .await
            .unwrap();
        let b = tx
            .insert(&tables::BRANCHES, &record(json!({"name": "B"})))
            .await
            .unwrap();
        let (a, b) = (record_id(&a, "id").unwrap(), record_id(&b, "id").unwrap());

        let printer = tx
            .insert(&tables::BRANCH_PRINTERS, &record(json!({"branch_id": a, "printer_name": "HP"})))
            .await
            .unwrap();
        let row = record_id(&printer, "id").unwrap();

        let foreign = RowKey::Scoped { id: row, parent: b };
        assert!(tx.fetch(&tables::BRANCH_PRINTERS, foreign).await.unwrap().is_none());
        assert_eq!(tx.delete(&tables::BRANCH_PRINTERS, foreign).await.unwrap(), 0);

        let own = RowKey::Scoped { id: row, parent: a };
        assert!(tx.fetch(&tables::BRANCH_PRINTERS, own).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_faults_fail_writes() {
        let store = store();
        store.fail_writes_to("assets");

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        store.clear_faults();
        assert!(tx
            .insert(&tables::ASSETS, &record(json!({"assetCode": "A-1", "assetName": "x"})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        for (code, status) in [("A-1", "Active"), ("A-2", "Repair"), ("B-3", "Active")] {
            tx.insert(
                &tables::ASSETS,
                &record(json!({"assetCode": code, "assetName": "Laptop", "status": status})),
            )
            .await
            .unwrap();
        }

        let query = ListQuery {
            filters: vec![("status", "Active".to_string())],
            search: None,
            limit: 10,
            offset: 0,
        };
        let (rows, total) = tx.list(&tables::ASSETS, &query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);

        let query = ListQuery {
            filters: Vec::new(),
            search: Some((vec!["assetCode"], "a-".to_string())),
            limit: 1,
            offset: 1,
        };
        let (rows, total) = tx.list(&tables::ASSETS, &query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0]["assetCode"], json!("A-2"));
    }
}
