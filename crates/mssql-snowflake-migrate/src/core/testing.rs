//! In-memory source and destination fakes for pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{MigrateError, Result};

use super::schema::ResultColumn;
use super::traits::{
    DestinationConnection, DestinationConnector, QueryResult, SourceConnection, SourceConnector,
    StatementResult,
};
use super::value::{Row, SqlValue};

/// One `INFORMATION_SCHEMA.COLUMNS` row: (name, data type, nullable, max length).
pub type CatalogRow = (&'static str, &'static str, bool, Option<i32>);

#[derive(Debug, Clone, Default)]
pub struct SourceLog {
    pub connects: usize,
    pub closes: usize,
    pub queries: Vec<String>,
}

#[derive(Default)]
struct SourceState {
    tables: HashMap<String, QueryResult>,
    catalog: HashMap<(String, String), Vec<CatalogRow>>,
    catalog_error: bool,
    connect_error: bool,
    log: SourceLog,
}

/// Fake SQL Server: `SELECT * FROM <name>` returns the registered table,
/// catalog queries return the registered catalog rows.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, qualified: &str, columns: &[(&str, &str)], rows: Vec<Row>) -> Self {
        let result = QueryResult {
            columns: columns
                .iter()
                .map(|(name, ty)| ResultColumn::new(*name, Some(ty)))
                .collect(),
            rows,
        };
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(qualified.to_string(), result);
        self
    }

    pub fn with_catalog(self, schema: &str, table: &str, rows: Vec<CatalogRow>) -> Self {
        self.state
            .lock()
            .unwrap()
            .catalog
            .insert((schema.to_string(), table.to_string()), rows);
        self
    }

    pub fn failing_catalog(self) -> Self {
        self.state.lock().unwrap().catalog_error = true;
        self
    }

    pub fn failing_connect(self) -> Self {
        self.state.lock().unwrap().connect_error = true;
        self
    }

    pub fn log(&self) -> SourceLog {
        self.state.lock().unwrap().log.clone()
    }

    pub fn connection(&self) -> FakeSourceConnection {
        FakeSourceConnection {
            state: self.state.clone(),
            closed: false,
        }
    }
}

#[async_trait]
impl SourceConnector for FakeSource {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        let mut state = self.state.lock().unwrap();
        if state.connect_error {
            return Err(MigrateError::SourceConnection {
                code: Some(18456),
                state: Some(1),
                message: "Login failed for user 'etl'.".into(),
            });
        }
        state.log.connects += 1;
        drop(state);
        Ok(Box::new(self.connection()))
    }

    fn db_type(&self) -> &str {
        "fake"
    }
}

pub struct FakeSourceConnection {
    state: Arc<Mutex<SourceState>>,
    closed: bool,
}

#[async_trait]
impl SourceConnection for FakeSourceConnection {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<QueryResult> {
        let mut state = self.state.lock().unwrap();
        state.log.queries.push(sql.to_string());

        if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
            if state.catalog_error {
                return Err(MigrateError::SourceQuery {
                    code: Some(229),
                    state: Some(5),
                    message: "The SELECT permission was denied.".into(),
                });
            }
            let key = (
                params.first().copied().unwrap_or_default().to_string(),
                params.get(1).copied().unwrap_or_default().to_string(),
            );
            let rows = state.catalog.get(&key).cloned().unwrap_or_default();
            return Ok(catalog_result(&rows));
        }

        let (name, metadata_only) = match sql.strip_prefix("SELECT TOP 0 * FROM ") {
            Some(rest) => (rest.trim(), true),
            None => (sql.trim_start_matches("SELECT * FROM ").trim(), false),
        };
        let mut result = state.tables.get(name).cloned().ok_or_else(|| MigrateError::SourceQuery {
            code: Some(208),
            state: Some(1),
            message: format!("Invalid object name '{}'.", name),
        })?;
        if metadata_only {
            result.rows.clear();
        }
        Ok(result)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().log.closes += 1;
        }
        Ok(())
    }
}

fn catalog_result(rows: &[CatalogRow]) -> QueryResult {
    QueryResult {
        columns: vec![
            ResultColumn::new("COLUMN_NAME", Some("nvarchar")),
            ResultColumn::new("DATA_TYPE", Some("nvarchar")),
            ResultColumn::new("IS_NULLABLE", Some("varchar")),
            ResultColumn::new("CHARACTER_MAXIMUM_LENGTH", Some("int")),
        ],
        rows: rows
            .iter()
            .map(|(name, ty, nullable, len)| {
                vec![
                    SqlValue::from(*name),
                    SqlValue::from(*ty),
                    SqlValue::from(if *nullable { "YES" } else { "NO" }),
                    len.map(SqlValue::I32).unwrap_or(SqlValue::Null),
                ]
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestinationLog {
    pub connects: usize,
    pub closes: usize,
    pub executed: Vec<String>,
    pub inserts: Vec<String>,
    pub batch_sizes: Vec<usize>,
}

#[derive(Default)]
struct DestinationState {
    connect_error: bool,
    fail_execute_containing: Option<String>,
    fail_insert_on_batch: Option<usize>,
    short_write_by: u64,
    log: DestinationLog,
}

/// Fake Snowflake session that records every statement.
#[derive(Clone, Default)]
pub struct FakeDestination {
    state: Arc<Mutex<DestinationState>>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect(self) -> Self {
        self.state.lock().unwrap().connect_error = true;
        self
    }

    /// Reject any executed statement containing `needle`.
    pub fn failing_execute(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_execute_containing = Some(needle.to_string());
        self
    }

    /// Fail the n-th (1-based) insert call.
    pub fn fail_insert_on_batch(self, n: usize) -> Self {
        self.state.lock().unwrap().fail_insert_on_batch = Some(n);
        self
    }

    /// Report every insert as writing `n` fewer rows than sent.
    pub fn short_write_by(self, n: u64) -> Self {
        self.state.lock().unwrap().short_write_by = n;
        self
    }

    pub fn log(&self) -> DestinationLog {
        self.state.lock().unwrap().log.clone()
    }

    pub fn connection(&self) -> FakeDestinationConnection {
        FakeDestinationConnection {
            state: self.state.clone(),
            closed: false,
        }
    }
}

#[async_trait]
impl DestinationConnector for FakeDestination {
    async fn connect(&self) -> Result<Box<dyn DestinationConnection>> {
        let mut state = self.state.lock().unwrap();
        if state.connect_error {
            return Err(MigrateError::DestinationConnection(
                "390100: Incorrect username or password was specified.".into(),
            ));
        }
        state.log.connects += 1;
        drop(state);
        Ok(Box::new(self.connection()))
    }

    fn db_type(&self) -> &str {
        "fake"
    }
}

pub struct FakeDestinationConnection {
    state: Arc<Mutex<DestinationState>>,
    closed: bool,
}

#[async_trait]
impl DestinationConnection for FakeDestinationConnection {
    async fn execute(&mut self, sql: &str) -> Result<StatementResult> {
        let mut state = self.state.lock().unwrap();
        assert!(!self.closed, "execute on closed destination connection");
        if let Some(needle) = &state.fail_execute_containing {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::programming(
                    "003001",
                    "SQL access control error: Insufficient privileges to operate on schema 'SCH'",
                ));
            }
        }
        state.log.executed.push(sql.to_string());
        Ok(StatementResult::default())
    }

    async fn insert_rows(&mut self, insert_sql: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        assert!(!self.closed, "insert on closed destination connection");
        state.log.inserts.push(insert_sql.to_string());
        state.log.batch_sizes.push(rows.len());
        if state.fail_insert_on_batch == Some(state.log.batch_sizes.len()) {
            return Err(MigrateError::programming(
                "100038",
                "Numeric value 'abc' is not recognized",
            ));
        }
        Ok((rows.len() as u64).saturating_sub(state.short_write_by))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().log.closes += 1;
        }
        Ok(())
    }
}
