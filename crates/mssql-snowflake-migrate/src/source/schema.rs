//! Column metadata extraction from the SQL Server catalog.
//!
//! Row data is ordered by the executed `SELECT *`, so descriptors are built
//! in result-set order and only *looked up* in `INFORMATION_SCHEMA.COLUMNS`.
//! Anything the catalog cannot answer is degraded to nullable unbounded
//! text instead of failing the table.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::identifier::{quote_mssql, QualifiedName};
use crate::core::schema::{ColumnDescriptor, ExtractedSchema, ResultColumn, SchemaFidelity};
use crate::core::traits::{QueryResult, SourceConnection};
use crate::core::value::SqlValue;

/// Build the catalog query for one database. Schema and table are bound as
/// `@P1` and `@P2`.
pub fn catalog_columns_query(catalog: &str) -> String {
    format!(
        "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, CHARACTER_MAXIMUM_LENGTH \
         FROM {}.INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 \
         ORDER BY ORDINAL_POSITION",
        quote_mssql(catalog)
    )
}

/// Resolve column descriptors for `qualified_name`, in `result_columns` order.
///
/// Never fails: unparseable names, catalog errors and missing catalog rows
/// all produce degraded descriptors, reported through
/// [`ExtractedSchema::fidelity`].
pub async fn extract_columns(
    conn: &mut dyn SourceConnection,
    qualified_name: &str,
    result_columns: &[ResultColumn],
) -> ExtractedSchema {
    let (catalog, schema, table) = match QualifiedName::parse(qualified_name) {
        QualifiedName::Parsed {
            catalog,
            schema,
            table,
        } => (catalog, schema, table),
        QualifiedName::Unparsed(raw) => {
            let reason = format!("'{}' is not a [catalog].[schema].[table] name", raw);
            warn!("{}: {}; all columns degraded to VARCHAR", qualified_name, reason);
            return ExtractedSchema::degraded(result_columns, reason);
        }
    };

    let sql = catalog_columns_query(&catalog);
    let catalog_rows = match conn.query(&sql, &[schema.as_str(), table.as_str()]).await {
        Ok(result) => parse_catalog(&result),
        Err(e) => {
            let reason = format!("catalog lookup failed: {}", e);
            warn!("{}: {}; all columns degraded to VARCHAR", qualified_name, reason);
            return ExtractedSchema::degraded(result_columns, reason);
        }
    };

    if catalog_rows.is_empty() {
        let reason = format!("no catalog entry for {}.{}.{}", catalog, schema, table);
        warn!("{}: {}; all columns degraded to VARCHAR", qualified_name, reason);
        return ExtractedSchema::degraded(result_columns, reason);
    }

    let by_name: HashMap<&str, &ColumnDescriptor> =
        catalog_rows.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut degraded_columns = Vec::new();
    let columns = result_columns
        .iter()
        .map(|rc| {
            let found = by_name.get(rc.name.as_str()).copied().or_else(|| {
                catalog_rows
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&rc.name))
            });
            match found {
                Some(col) => ColumnDescriptor {
                    name: rc.name.clone(),
                    ..col.clone()
                },
                None => {
                    degraded_columns.push(rc.name.clone());
                    ColumnDescriptor::degraded(rc.name.clone())
                }
            }
        })
        .collect();

    let fidelity = if degraded_columns.is_empty() {
        debug!(
            "{}: resolved {} columns from catalog",
            qualified_name,
            result_columns.len()
        );
        SchemaFidelity::Catalog
    } else {
        warn!(
            "{}: columns not in catalog, degraded to VARCHAR: {:?}",
            qualified_name, degraded_columns
        );
        SchemaFidelity::Partial { degraded_columns }
    };

    ExtractedSchema { columns, fidelity }
}

/// Turn catalog rows into descriptors, skipping rows without a name.
fn parse_catalog(result: &QueryResult) -> Vec<ColumnDescriptor> {
    let idx = |name: &str| result.column_index(name);
    let (Some(name_idx), Some(type_idx)) = (idx("COLUMN_NAME"), idx("DATA_TYPE")) else {
        return Vec::new();
    };
    let nullable_idx = idx("IS_NULLABLE");
    let length_idx = idx("CHARACTER_MAXIMUM_LENGTH");

    result
        .rows
        .iter()
        .filter_map(|row| {
            let name = text_at(row, Some(name_idx))?;
            Some(ColumnDescriptor {
                name,
                native_type: text_at(row, Some(type_idx)).unwrap_or_default(),
                nullable: text_at(row, nullable_idx)
                    .map(|v| v.eq_ignore_ascii_case("YES"))
                    .unwrap_or(true),
                character_length: int_at(row, length_idx),
            })
        })
        .collect()
}

fn text_at(row: &[SqlValue], idx: Option<usize>) -> Option<String> {
    match row.get(idx?)? {
        SqlValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn int_at(row: &[SqlValue], idx: Option<usize>) -> Option<i32> {
    match row.get(idx?)? {
        SqlValue::I16(v) => Some(i32::from(*v)),
        SqlValue::I32(v) => Some(*v),
        SqlValue::I64(v) => i32::try_from(*v).ok(),
        _ => None,
    }
}
