//! Type mapping between MSSQL and Snowflake.

/// Longest VARCHAR Snowflake accepts; also the type used for unbounded text.
pub const SNOWFLAKE_MAX_VARCHAR: i32 = 16_777_216;

/// `VARCHAR(16777216)`, the fallback type for anything without a better mapping.
pub fn max_varchar() -> String {
    format!("VARCHAR({})", SNOWFLAKE_MAX_VARCHAR)
}

/// Map an MSSQL data type to Snowflake.
///
/// `character_length` is `CHARACTER_MAXIMUM_LENGTH` from the catalog; `-1`
/// means `(max)`. Never fails: unknown types fall back to [`max_varchar`].
pub fn mssql_to_snowflake(mssql_type: &str, character_length: Option<i32>) -> String {
    match mssql_type.trim().to_lowercase().as_str() {
        // String types
        "char" | "varchar" | "nchar" | "nvarchar" => match character_length {
            Some(len) if len > 0 && len <= SNOWFLAKE_MAX_VARCHAR => format!("VARCHAR({})", len),
            _ => max_varchar(),
        },
        "text" | "ntext" => max_varchar(),

        // Integer and exact numeric types
        "int" | "bigint" | "smallint" | "tinyint" | "decimal" | "numeric" => "NUMBER".to_string(),

        // Boolean
        "bit" => "BOOLEAN".to_string(),

        // Approximate and monetary
        "float" | "real" | "money" | "smallmoney" => "FLOAT".to_string(),

        // Date/time types
        "date" => "DATE".to_string(),
        "datetime" | "datetime2" | "smalldatetime" => "TIMESTAMP_NTZ".to_string(),
        "datetimeoffset" => "TIMESTAMP_TZ".to_string(),
        "time" => "TIME".to_string(),

        // Binary types
        "binary" | "varbinary" | "image" => "BINARY".to_string(),

        // Default fallback
        _ => max_varchar(),
    }
}
