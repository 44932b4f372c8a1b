//! MSSQL source.
//!
//! - [`mssql`]: tiberius client implementing the source traits
//! - [`schema`]: catalog lookup of column metadata

pub mod mssql;
pub mod schema;

pub use mssql::{MssqlConnection, MssqlConnector};
pub use schema::extract_columns;
