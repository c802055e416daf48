use thiserror::Error;

use crate::model::{Record, RowId, TableDef};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("{0}")]
    UniqueViolation(String),

    /// A reference or check constraint rejected the write
    #[error("{0}")]
    ReferenceViolation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// How a single table operation addresses its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKey {
    /// The row's own primary key (parents and serial-keyed children)
    Id(RowId),
    /// Every row whose parent reference equals the id; for 1:1 tables
    /// that is at most one row
    Parent(RowId),
    /// A serial-keyed child row that must also belong to `parent`
    Scoped { id: RowId, parent: RowId },
}

/// Ordering for reads of many rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: &'static str,
    pub descending: bool,
}

impl SortOrder {
    pub const fn ascending(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn descending(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// Filtered, paged read of a parent table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// (field, value) pairs matched by equality
    pub filters: Vec<(&'static str, String)>,
    /// Case-insensitive substring match over the listed fields
    pub search: Option<(Vec<&'static str>, String)>,
    pub limit: u64,
    pub offset: u64,
}

/// One unit of work. Nothing written through it is visible to anyone
/// else until `commit`; dropping it without committing rolls it back.
#[async_trait::async_trait]
pub trait StoreTx: Send {
    async fn fetch(&mut self, table: &TableDef, key: RowKey) -> StoreResult<Option<Record>>;

    /// All rows referencing `parent`
    async fn fetch_all(
        &mut self,
        table: &TableDef,
        parent: RowId,
        order: SortOrder,
    ) -> StoreResult<Vec<Record>>;

    /// Insert a row from declared fields; returns the stored row
    async fn insert(&mut self, table: &TableDef, values: &Record) -> StoreResult<Record>;

    /// Apply `changes` to the addressed row; `None` when no row matched
    async fn update(
        &mut self,
        table: &TableDef,
        key: RowKey,
        changes: &Record,
    ) -> StoreResult<Option<Record>>;

    /// Delete the addressed rows, returning how many were removed
    async fn delete(&mut self, table: &TableDef, key: RowKey) -> StoreResult<u64>;

    /// Page of rows plus the total number of matches
    async fn list(&mut self, table: &TableDef, query: &ListQuery) -> StoreResult<(Vec<Record>, u64)>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Storage backend able to open units of work.
#[async_trait::async_trait]
pub trait AggregateStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}
