use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::audit_log::AuditLog;
use crate::logic::coordinator::begin;
use crate::model::{
    record_id, AggregateDef, AggregateKind, ComposedDocument, InventorySchema, RowId, ID_FIELD,
};
use crate::store::{AggregateStore, RowKey, SortOrder, StoreTx};

/// Loads a parent with all declared children into one document.
///
/// Each relation is fetched with its own query, so collections never
/// multiply each other's rows.
pub struct AggregateReader<S: AggregateStore> {
    store: Arc<S>,
    schema: Arc<InventorySchema>,
}

impl<S: AggregateStore> AggregateReader<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self { store, schema }
    }

    pub async fn read_aggregate(
        &self,
        kind: AggregateKind,
        parent_id: RowId,
    ) -> AggregateResult<ComposedDocument> {
        let aggregate = self.schema.aggregate(kind);
        let mut tx = begin(self.store.as_ref()).await?;
        let result = Self::compose(tx.as_mut(), aggregate, parent_id).await;
        if let Err(e) = tx.rollback().await {
            log::warn!("Failed to release read of {} {}: {}", kind.section(), parent_id, e);
        }
        result
    }

    async fn compose(
        tx: &mut dyn StoreTx,
        aggregate: &AggregateDef,
        parent_id: RowId,
    ) -> AggregateResult<ComposedDocument> {
        let read_err =
            |table: &str, e| AggregateError::from_store(format!("reading {}", table), e);

        let parent = tx
            .fetch(aggregate.parent, RowKey::Id(parent_id))
            .await
            .map_err(|e| read_err(aggregate.parent.name, e))?
            .ok_or_else(|| AggregateError::not_found(aggregate.kind, parent_id))?;

        let mut singular = BTreeMap::new();
        for relation in aggregate.singular() {
            let row = tx
                .fetch(relation.table, RowKey::Parent(parent_id))
                .await
                .map_err(|e| read_err(relation.table.name, e))?;
            if let Some(row) = row {
                singular.insert(relation.child.label(), row);
            }
        }

        let mut lookups = BTreeMap::new();
        for lookup in &aggregate.lookups {
            let Some(id) = record_id(&parent, lookup.field) else {
                continue;
            };
            let row = tx
                .fetch(lookup.table, RowKey::Id(id))
                .await
                .map_err(|e| read_err(lookup.table.name, e))?;
            if let Some(row) = row {
                lookups.insert(lookup.label, row);
            }
        }

        let mut collections = BTreeMap::new();
        for relation in aggregate.collections() {
            let rows = tx
                .fetch_all(relation.table, parent_id, SortOrder::ascending(ID_FIELD))
                .await
                .map_err(|e| read_err(relation.table.name, e))?;
            collections.insert(relation.child.label(), rows);
        }

        let remarks = AuditLog::new(&aggregate.audit)
            .history(tx, parent_id)
            .await?;

        Ok(ComposedDocument {
            parent,
            singular,
            lookups,
            collections,
            remarks,
        })
    }
}
