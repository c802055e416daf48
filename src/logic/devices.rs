use std::sync::Arc;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::coordinator::{begin, settle};
use crate::logic::reconcile::Reconciler;
use crate::logic::validate::{Mode, Validator};
use crate::model::{
    AggregateDef, Cardinality, ChildKind, InventorySchema, Record, Relation, RowId, ID_FIELD,
};
use crate::store::{AggregateStore, RowKey, SortOrder, StoreTx};

/// Operations on individual 1:N rows under a parent. Each call is its
/// own unit of work; the parent row and its audit history are untouched.
pub struct DeviceRegistry<S: AggregateStore> {
    store: Arc<S>,
    schema: Arc<InventorySchema>,
}

impl<S: AggregateStore> DeviceRegistry<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self { store, schema }
    }

    fn collection(&self, kind: ChildKind) -> AggregateResult<(&AggregateDef, Relation)> {
        match self.schema.owner_of(kind) {
            Some((aggregate, relation)) if relation.cardinality == Cardinality::Many => {
                Ok((aggregate, *relation))
            }
            _ => Err(AggregateError::validation(format!(
                "{} is not a device collection",
                kind
            ))),
        }
    }

    /// Rows of `kind` under `parent_id`, ordered by row id
    pub async fn list(&self, kind: ChildKind, parent_id: RowId) -> AggregateResult<Vec<Record>> {
        let (aggregate, relation) = self.collection(kind)?;
        let mut tx = begin(self.store.as_ref()).await?;
        let result = Self::list_rows(tx.as_mut(), aggregate, &relation, parent_id).await;
        if let Err(e) = tx.rollback().await {
            log::warn!("Failed to release read of {}: {}", relation.table.name, e);
        }
        result
    }

    async fn list_rows(
        tx: &mut dyn StoreTx,
        aggregate: &AggregateDef,
        relation: &Relation,
        parent_id: RowId,
    ) -> AggregateResult<Vec<Record>> {
        ensure_parent(tx, aggregate, parent_id).await?;
        tx.fetch_all(relation.table, parent_id, SortOrder::ascending(ID_FIELD))
            .await
            .map_err(|e| AggregateError::from_store(format!("reading {}", relation.table.name), e))
    }

    pub async fn create(
        &self,
        kind: ChildKind,
        parent_id: RowId,
        payload: &Record,
    ) -> AggregateResult<Record> {
        let (aggregate, relation) = self.collection(kind)?;
        let values = Validator::normalize(relation.table, Mode::Create, payload)?;

        let mut tx = begin(self.store.as_ref()).await?;
        let result = async {
            ensure_parent(tx.as_mut(), aggregate, parent_id).await?;
            Reconciler::create(tx.as_mut(), &relation, parent_id, values).await
        }
        .await;
        settle(tx, result, &format!("create {} row for {}", kind, parent_id)).await
    }

    /// Partial merge onto a row that must belong to `parent_id`
    pub async fn update(
        &self,
        kind: ChildKind,
        parent_id: RowId,
        row_id: RowId,
        payload: &Record,
    ) -> AggregateResult<Record> {
        let (_, relation) = self.collection(kind)?;
        let changes = Validator::normalize(relation.table, Mode::Update, payload)?;

        let mut tx = begin(self.store.as_ref()).await?;
        let result =
            Reconciler::reconcile(tx.as_mut(), &relation, parent_id, Some(row_id), &changes).await;
        settle(tx, result, &format!("update {} row {}", kind, row_id)).await
    }

    pub async fn delete(&self, kind: ChildKind, parent_id: RowId, row_id: RowId) -> AggregateResult<()> {
        let (_, relation) = self.collection(kind)?;
        let table = relation.table;

        let mut tx = begin(self.store.as_ref()).await?;
        let result = match tx
            .delete(table, RowKey::Scoped { id: row_id, parent: parent_id })
            .await
        {
            Ok(0) => Err(AggregateError::not_found(format!("{} row", kind), row_id)),
            Ok(_) => Ok(()),
            Err(e) => Err(AggregateError::from_store(format!("deleting from {}", table.name), e)),
        };
        settle(tx, result, &format!("delete {} row {}", kind, row_id)).await
    }
}

async fn ensure_parent(
    tx: &mut dyn StoreTx,
    aggregate: &AggregateDef,
    parent_id: RowId,
) -> AggregateResult<()> {
    let parent = tx
        .fetch(aggregate.parent, RowKey::Id(parent_id))
        .await
        .map_err(|e| AggregateError::from_store(format!("reading {}", aggregate.parent.name), e))?;
    match parent {
        Some(_) => Ok(()),
        None => Err(AggregateError::not_found(aggregate.kind, parent_id)),
    }
}
