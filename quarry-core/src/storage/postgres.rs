//! PostgresBackend - JSONB document table
//!
//! TigerStyle: Every query value is a bound parameter. Only the table and
//! column names, checked at construction, are part of the SQL text.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <table> (
//!     pk JSONB PRIMARY KEY,
//!     doc JSONB NOT NULL
//! );
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query as SqlQuery;
use sqlx::Row;

use super::backend::StorageBackend;
use super::cursor::{Cursor, CursorWindow, RecordSource, SortOrder};
use super::error::{StorageError, StorageResult};
use crate::key::Key;
use crate::query::Query;
use crate::translate::{SqlFilter, SqlParam, SqlTranslator, Translator};
use crate::Record;

const DOCUMENT_COLUMN: &str = "doc";
const POOL_CONNECTIONS_MAX: u32 = 10;
const UNIQUE_VIOLATION: &str = "23505";

// =============================================================================
// PostgresBackend
// =============================================================================

/// PostgreSQL storage backend, one table per collection.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    table: Arc<str>,
    translator: SqlTranslator,
}

impl PostgresBackend {
    /// Connect and create the table if needed.
    ///
    /// # Errors
    /// Returns error if connection fails or the schema cannot be created.
    ///
    /// # Panics
    /// Panics if the URL is not a postgres URL or the table name is not a
    /// plain identifier.
    ///
    /// # Example
    /// ```ignore
    /// let users = PostgresBackend::new("postgres://localhost/quarry", "users").await?;
    /// ```
    pub async fn new(connection_string: &str, table: &str) -> StorageResult<Self> {
        // Preconditions
        assert!(
            connection_string.starts_with("postgres://")
                || connection_string.starts_with("postgresql://"),
            "connection string must be postgres URL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(POOL_CONNECTIONS_MAX)
            .connect(connection_string)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        Self::from_pool(pool, table).await
    }

    /// Create from an existing pool, shared across tables.
    ///
    /// # Errors
    /// Returns error if the schema cannot be created.
    ///
    /// # Panics
    /// Panics if the table name is not a plain identifier.
    pub async fn from_pool(pool: PgPool, table: &str) -> StorageResult<Self> {
        // Precondition: the table name is spliced into SQL text
        assert!(
            !table.is_empty()
                && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !table.starts_with(|c: char| c.is_ascii_digit()),
            "table must be a plain identifier, got {table:?}"
        );

        let backend = Self {
            pool,
            table: Arc::from(table),
            translator: SqlTranslator::new(DOCUMENT_COLUMN),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (pk JSONB PRIMARY KEY, {DOCUMENT_COLUMN} JSONB NOT NULL)",
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::internal(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Delete every row (for tests).
    pub async fn clear(&self) -> StorageResult<()> {
        let sql = format!("DELETE FROM {}", self.table);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("failed to clear: {e}")))?;
        Ok(())
    }

    fn cursor(&self, filter: SqlFilter) -> Cursor {
        Cursor::new(Arc::new(TableSource {
            pool: self.pool.clone(),
            table: Arc::clone(&self.table),
            filter,
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn bind_params<'q>(
    mut query: SqlQuery<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> SqlQuery<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(text) => query.bind(text.clone()),
            SqlParam::Path(path) => query.bind(path.clone()),
            SqlParam::Json(value) => query.bind(value.clone()),
            SqlParam::Int(n) => query.bind(*n),
        };
    }
    query
}

fn row_to_record(row: &PgRow) -> StorageResult<Record> {
    let doc: Value = row
        .try_get(DOCUMENT_COLUMN)
        .map_err(|e| StorageError::read(format!("failed to get {DOCUMENT_COLUMN}: {e}")))?;
    match doc {
        Value::Object(record) => Ok(record),
        other => Err(StorageError::read(format!(
            "stored document is not an object: {other}"
        ))),
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// =============================================================================
// StorageBackend Implementation
// =============================================================================

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn collection(&self) -> &str {
        &self.table
    }

    async fn insert(&self, primary_name: &str, key: &Key, mut record: Record) -> StorageResult<()> {
        record.insert(primary_name.to_string(), key.to_value());

        let sql = format!(
            "INSERT INTO {} (pk, {DOCUMENT_COLUMN}) VALUES ($1, $2)",
            self.table
        );
        sqlx::query(&sql)
            .bind(key.to_value())
            .bind(Value::Object(record))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                    StorageError::duplicate_key(self.table.as_ref(), key.clone())
                }
                other => StorageError::write(format!("failed to insert: {other}")),
            })?;
        Ok(())
    }

    async fn update(&self, _primary_name: &str, key: &Key, patch: Record) -> StorageResult<bool> {
        let sql = format!(
            "UPDATE {} SET {DOCUMENT_COLUMN} = {DOCUMENT_COLUMN} || $2 WHERE pk = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(key.to_value())
            .bind(Value::Object(patch))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("failed to update: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, _primary_name: &str, key: &Key) -> StorageResult<Option<Record>> {
        let sql = format!("SELECT {DOCUMENT_COLUMN} FROM {} WHERE pk = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(key.to_value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::read(format!("failed to get: {e}")))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn remove(&self, query: &[Query]) -> StorageResult<u64> {
        let filter = self.translator.translate_all(query)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.table, filter.clause);
        let result = bind_params(sqlx::query(&sql), &filter.params)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write(format!("failed to remove: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn find(&self, query: &[Query]) -> StorageResult<Cursor> {
        let filter = self.translator.translate_all(query)?;
        Ok(self.cursor(filter))
    }

    async fn find_one(&self, query: &[Query]) -> StorageResult<Option<Record>> {
        self.find(query).await?.nth(0).await
    }

    async fn find_all(&self) -> StorageResult<Cursor> {
        Ok(self.cursor(self.translator.match_all()))
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

// =============================================================================
// Record Source
// =============================================================================

#[derive(Debug)]
struct TableSource {
    pool: PgPool,
    table: Arc<str>,
    filter: SqlFilter,
}

/// `SELECT` for a window, with sort paths, offset and limit appended as
/// parameters after the filter's own.
fn select_sql(table: &str, filter: &SqlFilter, window: &CursorWindow) -> (String, Vec<SqlParam>) {
    let mut params = filter.params.clone();
    let mut sql = format!(
        "SELECT {DOCUMENT_COLUMN} FROM {table} WHERE {}",
        filter.clause
    );

    if !window.sort.is_empty() {
        let mut terms = Vec::with_capacity(window.sort.len());
        for key in &window.sort {
            let path = key.attribute.split('.').map(str::to_string).collect();
            params.push(SqlParam::Path(path));
            let direction = match key.order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            terms.push(format!(
                "({DOCUMENT_COLUMN} #> ${}::text[]) {direction}",
                params.len()
            ));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    params.push(SqlParam::Int(to_i64(window.skip)));
    sql.push_str(&format!(" OFFSET ${}", params.len()));

    if let Some(limit) = window.limit {
        params.push(SqlParam::Int(to_i64(limit)));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    (sql, params)
}

#[async_trait]
impl RecordSource for TableSource {
    async fn fetch(&self, window: &CursorWindow) -> StorageResult<Vec<Record>> {
        let (sql, params) = select_sql(&self.table, &self.filter, window);
        let rows = bind_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::read(format!("failed to find: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self, window: &CursorWindow) -> StorageResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.table, self.filter.clause
        );
        let row = bind_params(sqlx::query(&sql), &self.filter.params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::read(format!("failed to count: {e}")))?;
        let matched: i64 = row
            .try_get(0)
            .map_err(|e| StorageError::read(format!("failed to get count: {e}")))?;

        Ok(window.clamp_count(u64::try_from(matched).unwrap_or(0)))
    }
}

// =============================================================================
// Tests
// =============================================================================
