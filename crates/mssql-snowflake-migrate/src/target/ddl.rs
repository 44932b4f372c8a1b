//! Snowflake statement generation.
//!
//! Destination tables are disposable copies: no defaults, keys or
//! constraints beyond nullability. All output is deterministic.

use crate::core::identifier::{qualify_snowflake, quote_snowflake};
use crate::core::schema::DestinationColumnSpec;

/// Generate the `CREATE OR REPLACE TABLE` statement for a destination table.
pub fn create_or_replace_table(
    database: &str,
    schema: &str,
    table: &str,
    specs: &[DestinationColumnSpec],
) -> String {
    let mut ddl = format!(
        "CREATE OR REPLACE TABLE {} (\n",
        qualify_snowflake(database, schema, table)
    );

    for (i, spec) in specs.iter().enumerate() {
        let nullable = if spec.nullable { "NULL" } else { "NOT NULL" };
        ddl.push_str(&format!(
            "    {} {} {}",
            quote_snowflake(&spec.name),
            spec.destination_type,
            nullable
        ));

        if i + 1 < specs.len() {
            ddl.push_str(",\n");
        } else {
            ddl.push('\n');
        }
    }

    ddl.push(')');
    ddl
}

/// Positional-bind INSERT used by the bulk loader.
pub fn insert_statement(database: &str, schema: &str, table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_snowflake(c)).collect();
    let binds = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualify_snowflake(database, schema, table),
        cols.join(", "),
        binds
    )
}

/// Empty a table before an overwriting load.
pub fn truncate_statement(database: &str, schema: &str, table: &str) -> String {
    format!(
        "TRUNCATE TABLE IF EXISTS {}",
        qualify_snowflake(database, schema, table)
    )
}
