//! Collaborator traits for the migration pipeline.
//!
//! - [`SourceConnector`] / [`SourceConnection`]: run SQL against the source
//!   and return rows plus result-set column metadata
//! - [`DestinationConnector`] / [`DestinationConnection`]: run DDL/DML
//!   against the destination and bulk-append rows into a named table
//!
//! The pipeline only talks to these traits. `source::mssql` and
//! `target::snowflake` provide the real implementations; tests use in-memory
//! fakes.
//!
//! # Design Patterns
//!
//! - **Abstract Factory**: connectors create connections
//! - **Template Method**: [`DestinationConnection::bulk_append`] defines the
//!   batching skeleton on top of the `execute`/`insert_rows` primitives

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MigrateError, Result};

use super::identifier::qualify_snowflake;
use super::schema::ResultColumn;
use super::value::Row;

/// Default rows per bulk-load batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Rows and result-set metadata of an executed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Result-set columns, in query order.
    pub columns: Vec<ResultColumn>,

    /// Row tuples aligned with `columns`.
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Find the index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Opens connections to the source database.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open a new connection. Each call returns an independent connection.
    async fn connect(&self) -> Result<Box<dyn SourceConnection>>;

    /// Get the database type identifier (e.g., "mssql").
    fn db_type(&self) -> &str;
}

/// A live source connection.
#[async_trait]
pub trait SourceConnection: Send {
    /// Execute a query with positional string parameters (`@P1`, `@P2`, ...)
    /// and fetch every row of the first result set.
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<QueryResult>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Outcome of a single destination statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementResult {
    /// Destination-assigned query id, when reported.
    pub query_id: Option<String>,

    /// Rows inserted/updated/deleted, when reported.
    pub rows_affected: Option<u64>,
}

/// Parameters for [`DestinationConnection::bulk_append`].
#[derive(Debug, Clone, Copy)]
pub struct BulkAppend<'a> {
    pub database: &'a str,
    pub schema: &'a str,
    pub table: &'a str,
    /// Destination column names, aligned with each row.
    pub columns: &'a [String],
    pub rows: &'a [Row],
    /// Rows per insert batch (values below 1 are treated as 1).
    pub batch_size: usize,
    /// Empty the table before appending.
    pub overwrite: bool,
}

impl BulkAppend<'_> {
    pub fn qualified_table(&self) -> String {
        qualify_snowflake(self.database, self.schema, self.table)
    }
}

/// Result of a bulk append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadResult {
    /// Whether every batch was written in full.
    pub success: bool,

    /// Rows the destination reported as written.
    pub rows_written: u64,

    /// Number of batches sent.
    pub batches: usize,
}

/// Opens sessions against the destination warehouse.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Establish (and authenticate) a session.
    async fn connect(&self) -> Result<Box<dyn DestinationConnection>>;

    /// Get the database type identifier (e.g., "snowflake").
    fn db_type(&self) -> &str;
}

/// A live destination session.
#[async_trait]
pub trait DestinationConnection: Send {
    /// Execute one DDL or DML statement.
    ///
    /// Statement rejections surface as [`MigrateError::DestinationProgramming`].
    async fn execute(&mut self, sql: &str) -> Result<StatementResult>;

    /// Execute a positional-bind INSERT once per row in `rows`, as a single
    /// array-bound request. Returns the number of rows the destination wrote.
    async fn insert_rows(&mut self, insert_sql: &str, rows: &[Row]) -> Result<u64>;

    /// Close the session. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Append rows to an existing table in batches of `batch_size`.
    ///
    /// With `overwrite`, the table is truncated first. A failing batch aborts
    /// the load with [`MigrateError::DestinationLoad`]; batches already
    /// written stay in the table. A batch written short yields
    /// `success = false`.
    async fn bulk_append(&mut self, request: &BulkAppend<'_>) -> Result<BulkLoadResult> {
        let table = request.qualified_table();

        if request.overwrite {
            self.execute(&crate::target::ddl::truncate_statement(
                request.database,
                request.schema,
                request.table,
            ))
            .await
            .map_err(|e| MigrateError::load(&table, format!("truncate failed: {}", e)))?;
        }

        let insert_sql = crate::target::ddl::insert_statement(
            request.database,
            request.schema,
            request.table,
            request.columns,
        );

        let batch_size = request.batch_size.max(1);
        let total_batches = request.rows.len().div_ceil(batch_size);
        let mut result = BulkLoadResult {
            success: true,
            ..Default::default()
        };

        for (idx, batch) in request.rows.chunks(batch_size).enumerate() {
            let written = self.insert_rows(&insert_sql, batch).await.map_err(|e| {
                MigrateError::load(
                    &table,
                    format!(
                        "batch {}/{} failed after {} rows: {}",
                        idx + 1,
                        total_batches,
                        result.rows_written,
                        e
                    ),
                )
            })?;

            result.rows_written += written;
            result.batches += 1;
            debug!(
                "{}: batch {}/{} wrote {} rows",
                table,
                idx + 1,
                total_batches,
                written
            );

            if written != batch.len() as u64 {
                result.success = false;
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::FakeDestination;
    use crate::core::value::SqlValue;

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![SqlValue::I64(i as i64)]).collect()
    }

    fn request<'a>(columns: &'a [String], rows: &'a [Row], batch_size: usize, overwrite: bool) -> BulkAppend<'a> {
        BulkAppend {
            database: "DB",
            schema: "SCH",
            table: "T",
            columns,
            rows,
            batch_size,
            overwrite,
        }
    }

    #[tokio::test]
    async fn test_bulk_append_batches_and_truncates() {
        let dest = FakeDestination::new();
        let mut conn = dest.connection();
        let columns = vec!["id".to_string()];
        let data = rows(5);

        let result = conn.bulk_append(&request(&columns, &data, 2, true)).await.unwrap();

        assert_eq!(
            result,
            BulkLoadResult {
                success: true,
                rows_written: 5,
                batches: 3
            }
        );
        let log = dest.log();
        assert_eq!(log.executed, vec![r#"TRUNCATE TABLE IF EXISTS "DB"."SCH"."T""#]);
        assert_eq!(log.batch_sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_bulk_append_without_overwrite_skips_truncate() {
        let dest = FakeDestination::new();
        let mut conn = dest.connection();
        let columns = vec!["id".to_string()];
        let data = rows(3);

        let result = conn.bulk_append(&request(&columns, &data, 0, false)).await.unwrap();

        assert_eq!(result.rows_written, 3);
        assert_eq!(result.batches, 3);
        assert!(dest.log().executed.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_append_failing_batch_reports_progress() {
        let dest = FakeDestination::new().fail_insert_on_batch(2);
        let mut conn = dest.connection();
        let columns = vec!["id".to_string()];
        let data = rows(5);

        let err = conn
            .bulk_append(&request(&columns, &data, 2, true))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, MigrateError::DestinationLoad { .. }));
        assert!(msg.contains("batch 2/3 failed after 2 rows"), "{}", msg);
    }

    #[tokio::test]
    async fn test_bulk_append_short_write_is_unsuccessful() {
        let dest = FakeDestination::new().short_write_by(1);
        let mut conn = dest.connection();
        let columns = vec!["id".to_string()];
        let data = rows(4);

        let result = conn.bulk_append(&request(&columns, &data, 2, false)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.rows_written, 1);
        assert_eq!(result.batches, 1);
    }
}
