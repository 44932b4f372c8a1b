//! Identifier parsing and quoting.
//!
//! SQL identifiers cannot be bound as parameters, so every name that ends up
//! in generated SQL goes through one of the quoting functions here:
//!
//! - [`quote_snowflake`]: `"name"` with embedded `"` doubled
//! - [`quote_mssql`]: `[name]` with embedded `]` doubled
//!
//! [`QualifiedName::parse`] splits a three-part SQL Server name such as
//! `[Data_Lab].[dbo].[wf_kpi]` into its parts.

use std::fmt;

use crate::error::{MigrateError, Result};

/// Maximum identifier length (SQL Server's limit; Snowflake allows 255).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than [`MAX_IDENTIFIER_LENGTH`] characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let chars = name.chars().count();
    if chars > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, chars, name
        )));
    }

    Ok(())
}

/// Quote a Snowflake identifier, preserving case and special characters.
pub fn quote_snowflake(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL Server identifier using brackets.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Fully qualify a Snowflake table: `"db"."schema"."table"`.
pub fn qualify_snowflake(database: &str, schema: &str, table: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_snowflake(database),
        quote_snowflake(schema),
        quote_snowflake(table)
    )
}

/// Result of parsing a source table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualifiedName {
    /// A strict `catalog.schema.table` name.
    Parsed {
        catalog: String,
        schema: String,
        table: String,
    },
    /// Anything that is not exactly three well-formed parts.
    Unparsed(String),
}

impl QualifiedName {
    /// Parse a three-part name. Parts may be bracket-quoted (`[a b]`, with
    /// `]]` for a literal `]`) or bare identifiers.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match split_parts(trimmed) {
            Some(mut parts) if parts.len() == 3 => {
                let table = parts.pop().unwrap_or_default();
                let schema = parts.pop().unwrap_or_default();
                let catalog = parts.pop().unwrap_or_default();
                QualifiedName::Parsed {
                    catalog,
                    schema,
                    table,
                }
            }
            _ => QualifiedName::Unparsed(trimmed.to_string()),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, QualifiedName::Parsed { .. })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualifiedName::Parsed {
                catalog,
                schema,
                table,
            } => write!(
                f,
                "{}.{}.{}",
                quote_mssql(catalog),
                quote_mssql(schema),
                quote_mssql(table)
            ),
            QualifiedName::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Split `a.b.c` into parts, honouring bracket quoting. Returns `None` on any
/// malformed part (empty, unterminated bracket, illegal bare character).
fn split_parts(input: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut pos = 0;

    loop {
        let (part, next) = if chars.get(pos) == Some(&'[') {
            read_bracketed(&chars, pos + 1)?
        } else {
            read_bare(&chars, pos)?
        };
        validate_identifier(&part).ok()?;
        parts.push(part);
        pos = next;

        match chars.get(pos) {
            None => return Some(parts),
            Some('.') => pos += 1,
            Some(_) => return None,
        }
    }
}

fn read_bracketed(chars: &[char], mut pos: usize) -> Option<(String, usize)> {
    let mut part = String::new();
    loop {
        match chars.get(pos)? {
            ']' if chars.get(pos + 1) == Some(&']') => {
                part.push(']');
                pos += 2;
            }
            ']' => return Some((part, pos + 1)),
            c => {
                part.push(*c);
                pos += 1;
            }
        }
    }
}

fn read_bare(chars: &[char], start: usize) -> Option<(String, usize)> {
    let first = *chars.get(start)?;
    if !(first.is_alphabetic() || matches!(first, '_' | '@' | '#')) {
        return None;
    }
    let mut end = start + 1;
    while let Some(c) = chars.get(end) {
        if c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$') {
            end += 1;
        } else {
            break;
        }
    }
    Some((chars[start..end].iter().collect(), end))
}
