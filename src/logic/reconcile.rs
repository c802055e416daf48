use serde_json::Value;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::validate::Validator;
use crate::model::{Cardinality, Record, Relation, RowId};
use crate::store::{RowKey, StoreTx};

/// Create-or-merge of child rows inside an open unit of work.
///
/// Inputs are already normalized: absent fields are left alone, explicit
/// nulls clear the column.
pub struct Reconciler;

impl Reconciler {
    /// Upsert a 1:1 child keyed by `parent_id`, or merge onto the 1:N row
    /// `row_id` when it belongs to `parent_id`.
    pub async fn reconcile(
        tx: &mut dyn StoreTx,
        relation: &Relation,
        parent_id: RowId,
        row_id: Option<RowId>,
        changes: &Record,
    ) -> AggregateResult<Record> {
        let table = relation.table;
        let step = || format!("reconciling {}", table.name);

        match relation.cardinality {
            Cardinality::One => {
                let key = RowKey::Parent(parent_id);
                let existing = tx
                    .fetch(table, key)
                    .await
                    .map_err(|e| AggregateError::from_store(step(), e))?;

                if existing.is_some() {
                    let updated = tx
                        .update(table, key, changes)
                        .await
                        .map_err(|e| AggregateError::from_store(step(), e))?;
                    return updated
                        .ok_or_else(|| AggregateError::not_found(relation.child, parent_id));
                }

                Self::create(tx, relation, parent_id, changes.clone()).await
            }
            Cardinality::Many => {
                let Some(id) = row_id else {
                    return Err(AggregateError::validation(format!(
                        "{} rows need an id to be updated",
                        relation.child
                    )));
                };
                let updated = tx
                    .update(table, RowKey::Scoped { id, parent: parent_id }, changes)
                    .await
                    .map_err(|e| AggregateError::from_store(step(), e))?;
                updated.ok_or_else(|| {
                    AggregateError::not_found(format!("{} row", relation.child), id)
                })
            }
        }
    }

    /// Insert a new child row scoped to `parent_id`
    pub async fn create(
        tx: &mut dyn StoreTx,
        relation: &Relation,
        parent_id: RowId,
        mut row: Record,
    ) -> AggregateResult<Record> {
        let table = relation.table;
        Validator::complete(table, &mut row)?;
        if let Some(field) = table.parent_field() {
            row.insert(field.to_string(), Value::from(parent_id));
        }

        tx.insert(table, &row)
            .await
            .map_err(|e| AggregateError::from_store(format!("inserting into {}", table.name), e))
    }
}
