//! Core abstractions for the migration pipeline.
//!
//! - [`schema`]: source column descriptors and destination column specs
//! - [`value`]: owned SQL values carried from source rows to the loader
//! - [`traits`]: source and destination collaborator traits
//! - [`identifier`]: qualified-name parsing and identifier quoting
//!
//! The pipeline and orchestrator depend only on these types; the concrete
//! SQL Server and Snowflake implementations live in `source` and `target`.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use identifier::QualifiedName;
pub use schema::{
    ColumnDescriptor, DestinationColumnSpec, ExtractedSchema, ResultColumn, SchemaFidelity,
};
pub use traits::{
    BulkAppend, BulkLoadResult, DestinationConnection, DestinationConnector, QueryResult,
    SourceConnection, SourceConnector, StatementResult, DEFAULT_BATCH_SIZE,
};
pub use value::{Row, SqlValue};
