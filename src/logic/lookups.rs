use std::sync::Arc;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::coordinator::begin;
use crate::model::{InventorySchema, Record, TableDef};
use crate::store::{AggregateStore, ListQuery};

/// Read access to the shared tables that aggregates reference by id
pub struct LookupDirectory<S: AggregateStore> {
    store: Arc<S>,
    schema: Arc<InventorySchema>,
}

impl<S: AggregateStore> LookupDirectory<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self { store, schema }
    }

    fn table(&self, name: &str) -> AggregateResult<&'static TableDef> {
        self.schema
            .aggregates()
            .into_iter()
            .flat_map(|aggregate| aggregate.lookups.iter())
            .map(|lookup| lookup.table)
            .find(|table| table.name == name)
            .ok_or_else(|| AggregateError::not_found("lookup table", name))
    }

    /// Every row of the lookup table `name`, ordered by id
    pub async fn list(&self, name: &str) -> AggregateResult<Vec<Record>> {
        let table = self.table(name)?;
        let query = ListQuery {
            filters: Vec::new(),
            search: None,
            limit: i64::MAX as u64,
            offset: 0,
        };

        let mut tx = begin(self.store.as_ref()).await?;
        let result = tx.list(table, &query).await;
        if let Err(e) = tx.rollback().await {
            log::warn!("Failed to release list of {}: {}", table.name, e);
        }
        let (rows, _) =
            result.map_err(|e| AggregateError::from_store(format!("listing {}", table.name), e))?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::tables;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_lists_service_stations_by_id() {
        let schema = Arc::new(InventorySchema::assemble().unwrap());
        let store = MemoryStore::new(&schema);

        let mut tx = store.begin().await.unwrap();
        for name in ["West Hub", "East Hub", "Central Workshop"] {
            let row = json!({"name": name}).as_object().unwrap().clone();
            tx.insert(&tables::SERVICE_STATIONS, &row).await.unwrap();
        }
        tx.commit().await.unwrap();

        let directory = LookupDirectory::new(Arc::new(store), schema);
        let rows = directory.list("service_stations").await.unwrap();
        let names: Vec<_> = rows.iter().map(|row| row["name"].clone()).collect();
        assert_eq!(names, vec![json!("West Hub"), json!("East Hub"), json!("Central Workshop")]);
        assert_eq!(rows[2]["id"], json!(3));
    }

    #[tokio::test]
    async fn test_non_lookup_table_is_not_found() {
        let schema = Arc::new(InventorySchema::assemble().unwrap());
        let directory = LookupDirectory::new(Arc::new(MemoryStore::new(&schema)), schema);

        let err = directory.list("branches").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
