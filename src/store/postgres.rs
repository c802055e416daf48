use anyhow::{Context, Result};
use itertools::Itertools;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};

use crate::model::{value_text, ColumnSource, Record, RowId, TableDef, ID_FIELD};
use crate::store::traits::{
    AggregateStore, ListQuery, RowKey, SortOrder, StoreError, StoreResult, StoreTx,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl AggregateStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// A pooled connection inside `BEGIN`. sqlx rolls the transaction back
/// when it is dropped without `commit`.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// SQL text plus its positional parameters. Every parameter is bound as
/// text and cast to the column type inside the statement.
#[derive(Debug, Default, PartialEq)]
struct Statement {
    sql: String,
    binds: Vec<Option<String>>,
}

impl Statement {
    fn param(&mut self, value: Option<String>, sql_type: &str) -> String {
        self.binds.push(value);
        format!("CAST(${} AS {})", self.binds.len(), sql_type)
    }

    fn id(&mut self, id: RowId) -> String {
        self.param(Some(id.to_string()), "bigint")
    }
}

fn key_clause(table: &TableDef, key: RowKey, stmt: &mut Statement) -> String {
    match key {
        RowKey::Id(id) => format!("t.{} = {}", table.key_column(), stmt.id(id)),
        RowKey::Parent(parent) => format!("t.{} = {}", parent_column(table), stmt.id(parent)),
        RowKey::Scoped { id, parent } => {
            let own = stmt.id(id);
            let scope = stmt.id(parent);
            format!("t.id = {} AND t.{} = {}", own, parent_column(table), scope)
        }
    }
}

fn parent_column(table: &TableDef) -> &'static str {
    table.parent.map_or(table.key_column(), |p| p.column)
}

fn column_for(table: &TableDef, field: &str) -> &'static str {
    if field == ID_FIELD {
        return table.key_column();
    }
    table
        .column(field)
        .map(|c| c.column)
        .unwrap_or_else(|| table.key_column())
}

fn select_statement(table: &TableDef, key: RowKey) -> Statement {
    let mut stmt = Statement::default();
    let clause = key_clause(table, key, &mut stmt);
    stmt.sql = format!(
        "SELECT to_jsonb(t) AS row FROM {} AS t WHERE {} LIMIT 1",
        table.name, clause
    );
    stmt
}

fn children_statement(table: &TableDef, parent: RowId, order: SortOrder) -> Statement {
    let mut stmt = Statement::default();
    let clause = key_clause(table, RowKey::Parent(parent), &mut stmt);
    let direction = if order.descending { "DESC" } else { "ASC" };
    stmt.sql = format!(
        "SELECT to_jsonb(t) AS row FROM {} AS t WHERE {} ORDER BY t.{} {}, t.{} {}",
        table.name,
        clause,
        column_for(table, order.field),
        direction,
        table.key_column(),
        direction
    );
    stmt
}

fn insert_statement(table: &TableDef, values: &Record) -> Statement {
    let mut stmt = Statement::default();
    let mut columns = Vec::new();
    let mut params = Vec::new();

    if let Some(parent) = table.parent {
        columns.push(parent.column);
        let value = values.get(parent.field).and_then(value_text);
        params.push(stmt.param(value, "bigint"));
    }
    for column in table.columns.iter().filter(|c| !c.is_timestamp()) {
        if let Some(value) = values.get(column.field) {
            columns.push(column.column);
            params.push(stmt.param(value_text(value), column.ty.sql_type()));
        }
    }

    stmt.sql = if columns.is_empty() {
        format!(
            "INSERT INTO {} AS t DEFAULT VALUES RETURNING to_jsonb(t) AS row",
            table.name
        )
    } else {
        format!(
            "INSERT INTO {} AS t ({}) VALUES ({}) RETURNING to_jsonb(t) AS row",
            table.name,
            columns.iter().join(", "),
            params.iter().join(", ")
        )
    };
    stmt
}

fn update_statement(table: &TableDef, key: RowKey, changes: &Record) -> Statement {
    let mut stmt = Statement::default();
    let mut sets = Vec::new();

    for column in table.columns {
        match column.source {
            ColumnSource::UpdatedAt => sets.push(format!("{} = now()", column.column)),
            ColumnSource::CreatedAt => {}
            _ => {
                if let Some(value) = changes.get(column.field) {
                    let param = stmt.param(value_text(value), column.ty.sql_type());
                    sets.push(format!("{} = {}", column.column, param));
                }
            }
        }
    }
    if sets.is_empty() {
        let key_column = table.key_column();
        sets.push(format!("{} = t.{}", key_column, key_column));
    }

    let clause = key_clause(table, key, &mut stmt);
    stmt.sql = format!(
        "UPDATE {} AS t SET {} WHERE {} RETURNING to_jsonb(t) AS row",
        table.name,
        sets.join(", "),
        clause
    );
    stmt
}

fn delete_statement(table: &TableDef, key: RowKey) -> Statement {
    let mut stmt = Statement::default();
    let clause = key_clause(table, key, &mut stmt);
    stmt.sql = format!("DELETE FROM {} AS t WHERE {}", table.name, clause);
    stmt
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Count and page statements sharing one filter clause
fn list_statements(table: &TableDef, query: &ListQuery) -> (Statement, Statement) {
    let mut stmt = Statement::default();
    let mut conditions = Vec::new();

    for (field, value) in &query.filters {
        let param = stmt.param(Some(value.clone()), "text");
        conditions.push(format!("t.{}::text = {}", column_for(table, field), param));
    }
    if let Some((fields, term)) = &query.search {
        let param = stmt.param(Some(format!("%{}%", escape_like(term))), "text");
        let any = fields
            .iter()
            .map(|field| format!("t.{}::text ILIKE {}", column_for(table, field), param))
            .join(" OR ");
        if !any.is_empty() {
            conditions.push(format!("({})", any));
        }
    }

    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count = Statement {
        sql: format!("SELECT COUNT(*) AS total FROM {} AS t{}", table.name, filter),
        binds: stmt.binds.clone(),
    };
    let page = Statement {
        sql: format!(
            "SELECT to_jsonb(t) AS row FROM {} AS t{} ORDER BY t.{} ASC LIMIT {} OFFSET {}",
            table.name,
            filter,
            table.key_column(),
            query.limit,
            query.offset
        ),
        binds: stmt.binds,
    };
    (count, page)
}

/// Translate a `to_jsonb` row (SQL column names) into wire field names
fn decode_row(table: &TableDef, row: Value) -> Record {
    let Value::Object(columns) = row else {
        return Record::new();
    };
    columns
        .into_iter()
        .filter_map(|(column, value)| {
            table
                .field_for_column(&column)
                .map(|field| (field.to_string(), value))
        })
        .collect()
}

fn map_error(err: sqlx::Error, action: String) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => return StoreError::UniqueViolation(db.message().to_string()),
            Some("23503") | Some("23514") | Some("23502") => {
                return StoreError::ReferenceViolation(db.message().to_string())
            }
            _ => {}
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(action))
}

impl PgTx {
    async fn rows(&mut self, table: &TableDef, stmt: Statement) -> StoreResult<Vec<Record>> {
        let mut query = sqlx::query(&stmt.sql);
        for value in &stmt.binds {
            query = query.bind(value.clone());
        }
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_error(e, format!("Failed to query {}", table.name)))?;

        rows.iter()
            .map(|row| {
                let value: Value = row
                    .try_get("row")
                    .with_context(|| format!("Failed to decode {} row", table.name))?;
                Ok(decode_row(table, value))
            })
            .collect()
    }

    async fn execute(&mut self, table: &TableDef, stmt: Statement) -> StoreResult<u64> {
        let mut query = sqlx::query(&stmt.sql);
        for value in &stmt.binds {
            query = query.bind(value.clone());
        }
        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_error(e, format!("Failed to write {}", table.name)))?;
        Ok(result.rows_affected())
    }

    async fn count(&mut self, table: &TableDef, stmt: Statement) -> StoreResult<u64> {
        let mut query = sqlx::query(&stmt.sql);
        for value in &stmt.binds {
            query = query.bind(value.clone());
        }
        let row = query
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_error(e, format!("Failed to count {}", table.name)))?;
        let total: i64 = row.try_get("total").context("Failed to decode row count")?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait::async_trait]
impl StoreTx for PgTx {
    async fn fetch(&mut self, table: &TableDef, key: RowKey) -> StoreResult<Option<Record>> {
        let rows = self.rows(table, select_statement(table, key)).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_all(
        &mut self,
        table: &TableDef,
        parent: RowId,
        order: SortOrder,
    ) -> StoreResult<Vec<Record>> {
        self.rows(table, children_statement(table, parent, order))
            .await
    }

    async fn insert(&mut self, table: &TableDef, values: &Record) -> StoreResult<Record> {
        let rows = self.rows(table, insert_statement(table, values)).await?;
        rows.into_iter().next().ok_or_else(|| {
            StoreError::Backend(anyhow::anyhow!("insert into {} returned no row", table.name))
        })
    }

    async fn update(
        &mut self,
        table: &TableDef,
        key: RowKey,
        changes: &Record,
    ) -> StoreResult<Option<Record>> {
        let rows = self
            .rows(table, update_statement(table, key, changes))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&mut self, table: &TableDef, key: RowKey) -> StoreResult<u64> {
        self.execute(table, delete_statement(table, key)).await
    }

    async fn list(&mut self, table: &TableDef, query: &ListQuery) -> StoreResult<(Vec<Record>, u64)> {
        let (count, page) = list_statements(table, query);
        let total = self.count(table, count).await?;
        let rows = self.rows(table, page).await?;
        Ok((rows, total))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.rollback()
            .await
            .context("Failed to roll back transaction")?;
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

    #[test]
    fn test_insert_binds_present_fields_and_parent() {
        let stmt = insert_statement(
            &tables::ASSET_TECHNICAL,
            &record(json!({"assetId": 4, "cpu": "i5", "ram": null})),
        );
        assert_eq!(
            stmt.sql,
            "INSERT INTO asset_technical_details AS t (asset_id, cpu, ram) \
             VALUES (CAST($1 AS bigint), CAST($2 AS text), CAST($3 AS text)) \
             RETURNING to_jsonb(t) AS row"
        );
        assert_eq!(
            stmt.binds,
            vec![Some("4".to_string()), Some("i5".to_string()), None]
        );
    }

    #[test]
    fn test_update_touches_updated_at_and_scopes_key() {
        let stmt = update_statement(
            &tables::BRANCH_PRINTERS,
            RowKey::Scoped { id: 9, parent: 2 },
            &record(json!({"printer_status": "Down"})),
        );
        assert_eq!(
            stmt.sql,
            "UPDATE branch_printers AS t SET printer_status = CAST($1 AS text), updated_at = now() \
             WHERE t.id = CAST($2 AS bigint) AND t.branch_id = CAST($3 AS bigint) \
             RETURNING to_jsonb(t) AS row"
        );
        assert_eq!(stmt.binds.len(), 3);
    }

    #[test]
    fn test_update_without_changes_is_still_valid_sql() {
        let stmt = update_statement(&tables::ASSET_LICENSE, RowKey::Parent(3), &Record::new());
        assert!(stmt.sql.starts_with("UPDATE asset_license_details AS t SET asset_id = t.asset_id"));
    }

    #[test]
    fn test_children_ordering_uses_columns() {
        let stmt = children_statement(
            &tables::ASSET_REMARKS,
            5,
            SortOrder::descending("dateUpdated"),
        );
        assert!(stmt
            .sql
            .ends_with("ORDER BY t.date_updated DESC, t.id DESC"));
        assert_eq!(stmt.binds, vec![Some("5".to_string())]);
    }

    #[test]
    fn test_list_statements_share_filters() {
        let query = ListQuery {
            filters: vec![("status", "Active".to_string())],
            search: Some((vec!["assetCode", "assetName"], "50%".to_string())),
            limit: 10,
            offset: 20,
        };
        let (count, page) = list_statements(&tables::ASSETS, &query);

        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS total FROM assets AS t WHERE t.status::text = CAST($1 AS text) \
             AND (t.asset_code::text ILIKE CAST($2 AS text) OR t.asset_name::text ILIKE CAST($2 AS text))"
        );
        assert!(page.sql.ends_with("ORDER BY t.id ASC LIMIT 10 OFFSET 20"));
        assert_eq!(count.binds, page.binds);
        assert_eq!(page.binds[1], Some("%50\\%%".to_string()));
    }

    #[test]
    fn test_decode_row_maps_columns_to_fields() {
        let row = json!({"id": 1, "asset_code": "A-1", "created_at": "2025-01-01T00:00:00+00:00", "x": 1});
        let record = decode_row(&tables::ASSETS, row);
        assert_eq!(record["assetCode"], json!("A-1"));
        assert_eq!(record["id"], json!(1));
        assert!(record.contains_key("createdAt"));
        assert!(!record.contains_key("x"));
    }
}
