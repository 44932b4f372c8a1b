//! Column metadata on both sides of the migration.
//!
//! A [`ColumnDescriptor`] describes a source column as SQL Server reports it;
//! a [`DestinationColumnSpec`] is the same column translated for Snowflake.
//! Both are always kept in result-set order, because row tuples are aligned
//! to that order and the bulk loader binds values positionally.

use serde::{Deserialize, Serialize};

use crate::typemap::mssql_to_snowflake;

/// Native type assumed for columns without catalog metadata.
pub const DEGRADED_NATIVE_TYPE: &str = "varchar";

/// A column as reported by the result-set metadata of an executed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    /// Column name as returned by the query.
    pub name: String,

    /// Wire-level type name when the driver reports one (e.g. "int", "nvarchar").
    pub native_type: Option<String>,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, native_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.map(str::to_string),
        }
    }
}

/// Source column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// SQL Server data type (e.g., "int", "varchar", "datetime2").
    pub native_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Maximum length for character types (-1 for max).
    pub character_length: Option<i32>,
}

impl ColumnDescriptor {
    /// Descriptor for a column whose catalog metadata is unavailable:
    /// unbounded character data, nullable.
    pub fn degraded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: DEGRADED_NATIVE_TYPE.to_string(),
            nullable: true,
            character_length: None,
        }
    }

    /// Translate this column for the destination.
    pub fn to_destination(&self) -> DestinationColumnSpec {
        DestinationColumnSpec {
            name: self.name.clone(),
            destination_type: mssql_to_snowflake(&self.native_type, self.character_length),
            nullable: self.nullable,
        }
    }
}

/// Destination column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationColumnSpec {
    /// Column name (unchanged from the source).
    pub name: String,

    /// Snowflake data type (e.g., "NUMBER", "VARCHAR(50)").
    pub destination_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,
}

/// Translate an ordered descriptor list, preserving order and length.
pub fn to_destination_specs(columns: &[ColumnDescriptor]) -> Vec<DestinationColumnSpec> {
    columns.iter().map(ColumnDescriptor::to_destination).collect()
}

/// How much of a table's schema came from the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaFidelity {
    /// Every column was found in the catalog.
    Catalog,

    /// Some result-set columns (computed or aliased) were not in the catalog.
    Partial { degraded_columns: Vec<String> },

    /// No catalog metadata was used; every column is unbounded text.
    Degraded { reason: String },
}

impl SchemaFidelity {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, SchemaFidelity::Catalog)
    }
}

/// Output of schema extraction for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSchema {
    /// Columns in result-set order.
    pub columns: Vec<ColumnDescriptor>,

    /// Where the metadata came from.
    pub fidelity: SchemaFidelity,
}

impl ExtractedSchema {
    /// Every result-set column degraded, with the reason recorded.
    pub fn degraded(result_columns: &[ResultColumn], reason: impl Into<String>) -> Self {
        Self {
            columns: result_columns
                .iter()
                .map(|c| ColumnDescriptor::degraded(c.name.clone()))
                .collect(),
            fidelity: SchemaFidelity::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
