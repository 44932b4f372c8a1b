//! # mssql-snowflake-migrate
//!
//! MSSQL to Snowflake table migration library.
//!
//! For each configured table the library:
//!
//! - **Extracts** rows and result-set metadata from SQL Server
//! - **Translates** column types using the SQL Server catalog, falling back
//!   to unbounded `VARCHAR` when the catalog cannot describe a column
//! - **Recreates** the destination table with `CREATE OR REPLACE TABLE`
//! - **Bulk loads** the rows in batches over one shared Snowflake session
//!
//! A failing table is reported and skipped; it never aborts the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_snowflake_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let report = orchestrator.run_all().await;
//!     println!("Migrated {} rows", report.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod source;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Authenticator, Config, DestinationConfig, MigrationConfig, SourceConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, Orchestrator, RunReport};
pub use pipeline::{JobStage, MigrationOutcome, TableJob, TableMigrator, TablePlan};
pub use source::MssqlConnector;
pub use target::SnowflakeConnector;
