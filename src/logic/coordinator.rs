//! All-or-nothing writes of a parent row together with its child sections.
//!
//! Every public operation validates its whole input first, then opens a
//! single unit of work and performs its steps in a fixed order: parent,
//! child sections in relation order, audit entry, commit. Any failure
//! rolls the unit back. A caller that abandons the future drops the unit,
//! which also rolls it back.

use chrono::Utc;
use std::error::Error as _;
use std::sync::Arc;

use crate::error::{AggregateError, AggregateResult};
use crate::logic::audit_log::AuditLog;
use crate::logic::reconcile::Reconciler;
use crate::logic::validate::{Mode, Validator};
use crate::model::{
    record_id, resolve_actor, AggregateDef, AggregateKind, AggregatePayload, Cardinality,
    InventorySchema, Principal, Record, Relation, RowId, SectionPayload, UpdateOutcome, ID_FIELD,
};
use crate::store::{AggregateStore, RowKey, StoreTx};

/// One child row after validation, waiting for the unit of work
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PreparedRow {
    /// Upsert a 1:1 child, or merge onto an existing 1:N row
    Merge { row_id: Option<RowId>, changes: Record },
    /// Explicitly create a row scoped to the parent
    Create(Record),
}

#[derive(Debug, Clone)]
pub(crate) struct PreparedSection {
    pub relation: Relation,
    pub rows: Vec<PreparedRow>,
}

/// Validate every section of `payload` for the given mode
pub(crate) fn prepare_sections(
    aggregate: &AggregateDef,
    payload: &AggregatePayload,
    mode: Mode,
) -> AggregateResult<Vec<PreparedSection>> {
    let mut prepared = Vec::with_capacity(payload.sections.len());

    for (child, section) in &payload.sections {
        let relation = *aggregate.relation(*child).ok_or_else(|| {
            AggregateError::validation(format!(
                "{} is not part of {}",
                child,
                aggregate.kind.section()
            ))
        })?;
        let table = relation.table;

        let rows = match (relation.cardinality, section) {
            (Cardinality::One, SectionPayload::Single(record)) => {
                let normalized = Validator::normalize(table, mode, record)?;
                match mode {
                    Mode::Create => vec![PreparedRow::Create(normalized)],
                    Mode::Update => vec![PreparedRow::Merge {
                        row_id: None,
                        changes: normalized,
                    }],
                }
            }
            (Cardinality::Many, SectionPayload::Rows(records)) => records
                .iter()
                .map(|record| match (mode, record_id(record, ID_FIELD)) {
                    (Mode::Update, Some(id)) => Ok(PreparedRow::Merge {
                        row_id: Some(id),
                        changes: Validator::normalize(table, Mode::Update, record)?,
                    }),
                    _ => Ok(PreparedRow::Create(Validator::normalize(
                        table,
                        Mode::Create,
                        record,
                    )?)),
                })
                .collect::<AggregateResult<Vec<_>>>()?,
            _ => {
                return Err(AggregateError::validation(format!(
                    "'{}' has the wrong shape",
                    child
                )))
            }
        };

        prepared.push(PreparedSection { relation, rows });
    }

    Ok(prepared)
}

/// Commit on success, roll back on failure, and log the outcome
pub(crate) async fn settle<T>(
    tx: Box<dyn StoreTx>,
    result: AggregateResult<T>,
    operation: &str,
) -> AggregateResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| AggregateError::from_store("committing", e))
                .map_err(|err| {
                    log::error!("{} failed to commit: {}", operation, describe(&err));
                    err
                })?;
            log::info!("{} committed", operation);
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                log::warn!("{}: rollback failed: {}", operation, rollback);
            }
            match err {
                AggregateError::TransactionFailed { .. } => {
                    log::error!("{} rolled back: {}", operation, describe(&err))
                }
                _ => log::warn!("{} rolled back: {}", operation, err),
            }
            Err(err)
        }
    }
}

/// Error message followed by its chain of causes
pub(crate) fn describe(err: &AggregateError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

pub(crate) async fn begin<S: AggregateStore + ?Sized>(store: &S) -> AggregateResult<Box<dyn StoreTx>> {
    store
        .begin()
        .await
        .map_err(|e| AggregateError::from_store("opening a transaction", e))
}

pub struct AggregateCoordinator<S: AggregateStore> {
    store: Arc<S>,
    schema: Arc<InventorySchema>,
}

impl<S: AggregateStore> AggregateCoordinator<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self { store, schema }
    }

    /// Insert the parent row and every present child section. No audit
    /// entry is written. Returns the new parent id.
    pub async fn create_aggregate(
        &self,
        kind: AggregateKind,
        payload: AggregatePayload,
    ) -> AggregateResult<RowId> {
        let aggregate = self.schema.aggregate(kind);
        let parent_input = payload.parent.clone().unwrap_or_default();
        let parent = Validator::normalize(aggregate.parent, Mode::Create, &parent_input)?;
        let sections = prepare_sections(aggregate, &payload, Mode::Create)?;

        let mut tx = begin(self.store.as_ref()).await?;
        let result = Self::apply_create(tx.as_mut(), aggregate, parent, &sections).await;
        settle(tx, result, &format!("create {}", kind.section())).await
    }

    async fn apply_create(
        tx: &mut dyn StoreTx,
        aggregate: &AggregateDef,
        parent: Record,
        sections: &[PreparedSection],
    ) -> AggregateResult<RowId> {
        let table = aggregate.parent;
        let stored = tx
            .insert(table, &parent)
            .await
            .map_err(|e| AggregateError::from_store(format!("inserting into {}", table.name), e))?;
        let parent_id = record_id(&stored, ID_FIELD).ok_or_else(|| {
            AggregateError::from_store(
                format!("inserting into {}", table.name),
                anyhow::anyhow!("stored row has no id").into(),
            )
        })?;

        Self::apply_sections(tx, parent_id, sections).await?;
        Ok(parent_id)
    }

    /// Merge parent changes and child sections onto an existing aggregate
    /// and append exactly one audit entry.
    ///
    /// A blank `updateRemark` is rejected before anything is opened.
    pub async fn update_aggregate(
        &self,
        kind: AggregateKind,
        parent_id: RowId,
        payload: AggregatePayload,
        principal: Option<&Principal>,
    ) -> AggregateResult<UpdateOutcome> {
        let remark = payload
            .remark
            .as_deref()
            .map(str::trim)
            .filter(|remark| !remark.is_empty())
            .ok_or_else(|| AggregateError::validation("updateRemark is required for updates"))?
            .to_string();

        let aggregate = self.schema.aggregate(kind);
        let parent_changes = match &payload.parent {
            Some(parent) => Validator::normalize(aggregate.parent, Mode::Update, parent)?,
            None => Record::new(),
        };
        let sections = prepare_sections(aggregate, &payload, Mode::Update)?;
        let actor = resolve_actor(payload.updated_by.as_deref(), principal);

        let mut tx = begin(self.store.as_ref()).await?;
        let result = Self::apply_update(
            tx.as_mut(),
            aggregate,
            parent_id,
            &parent_changes,
            &sections,
            &remark,
            &actor,
        )
        .await;
        settle(
            tx,
            result,
            &format!("update {} {} by {}", kind.section(), parent_id, actor),
        )
        .await
    }

    async fn apply_update(
        tx: &mut dyn StoreTx,
        aggregate: &AggregateDef,
        parent_id: RowId,
        parent_changes: &Record,
        sections: &[PreparedSection],
        remark: &str,
        actor: &str,
    ) -> AggregateResult<UpdateOutcome> {
        let table = aggregate.parent;
        let step = || format!("updating {}", table.name);

        let parent = tx
            .update(table, RowKey::Id(parent_id), parent_changes)
            .await
            .map_err(|e| AggregateError::from_store(step(), e))?
            .ok_or_else(|| AggregateError::not_found(aggregate.kind, parent_id))?;

        Self::apply_sections(tx, parent_id, sections).await?;

        let audit_entry_id = AuditLog::new(&aggregate.audit)
            .append(tx, parent_id, remark, actor, Utc::now())
            .await?;

        Ok(UpdateOutcome {
            parent,
            audit_entry_id,
        })
    }

    async fn apply_sections(
        tx: &mut dyn StoreTx,
        parent_id: RowId,
        sections: &[PreparedSection],
    ) -> AggregateResult<()> {
        for section in sections {
            for row in &section.rows {
                match row {
                    PreparedRow::Merge { row_id, changes } => {
                        Reconciler::reconcile(tx, &section.relation, parent_id, *row_id, changes)
                            .await?;
                    }
                    PreparedRow::Create(values) => {
                        Reconciler::create(tx, &section.relation, parent_id, values.clone())
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove every child row in relation order, then the audit history,
    /// then the parent.
    pub async fn delete_aggregate(&self, kind: AggregateKind, parent_id: RowId) -> AggregateResult<()> {
        let aggregate = self.schema.aggregate(kind);
        let mut tx = begin(self.store.as_ref()).await?;
        let result = Self::apply_delete(tx.as_mut(), aggregate, parent_id).await;
        settle(tx, result, &format!("delete {} {}", kind.section(), parent_id)).await
    }

    async fn apply_delete(
        tx: &mut dyn StoreTx,
        aggregate: &AggregateDef,
        parent_id: RowId,
    ) -> AggregateResult<()> {
        let parent = aggregate.parent;
        let exists = tx
            .fetch(parent, RowKey::Id(parent_id))
            .await
            .map_err(|e| AggregateError::from_store(format!("reading {}", parent.name), e))?;
        if exists.is_none() {
            return Err(AggregateError::not_found(aggregate.kind, parent_id));
        }

        let children = aggregate.relations.iter().map(|r| r.table);
        for table in children.chain(std::iter::once(aggregate.audit.table)) {
            let removed = tx
                .delete(table, RowKey::Parent(parent_id))
                .await
                .map_err(|e| AggregateError::from_store(format!("deleting from {}", table.name), e))?;
            if removed > 0 {
                log::debug!("Removed {} rows from {} for {}", removed, table.name, parent_id);
            }
        }

        tx.delete(parent, RowKey::Id(parent_id))
            .await
            .map_err(|e| AggregateError::from_store(format!("deleting from {}", parent.name), e))?;
        Ok(())
    }
}
