//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open a connection to the source database.
    #[error("Source connection failed{}: {message}", vendor_tag(.code, .state))]
    SourceConnection {
        code: Option<u32>,
        state: Option<u8>,
        message: String,
    },

    /// The source database rejected or failed a query.
    #[error("Source query failed{}: {message}", vendor_tag(.code, .state))]
    SourceQuery {
        code: Option<u32>,
        state: Option<u8>,
        message: String,
    },

    /// Could not establish (or authenticate) the destination session.
    #[error("Destination connection failed: {0}")]
    DestinationConnection(String),

    /// The destination rejected a statement (bad DDL, permission denied, ...).
    #[error("destination error {code}: {message}")]
    DestinationProgramming { code: String, message: String },

    /// Bulk load into a destination table failed; the table may be partially populated.
    #[error("Load failed for table {table}: {message}")]
    DestinationLoad { table: String, message: String },

    /// HTTP transport error talking to the destination.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// One or more tables ended in a failed state.
    #[error("{} table(s) failed: {}", .0.len(), .0.join(", "))]
    TablesFailed(Vec<String>),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn vendor_tag(code: &Option<u32>, state: &Option<u8>) -> String {
    match (code, state) {
        (Some(code), Some(state)) => format!(" (code {}, state {})", code, state),
        (Some(code), None) => format!(" (code {})", code),
        _ => String::new(),
    }
}

/// Split a tiberius error into (code, state, message).
fn tiberius_parts(err: &tiberius::error::Error) -> (Option<u32>, Option<u8>, String) {
    match err {
        tiberius::error::Error::Server(token) => (
            Some(token.code()),
            Some(token.state()),
            token.message().to_string(),
        ),
        other => (None, None, other.to_string()),
    }
}

impl MigrateError {
    /// Wrap a driver error raised while connecting to the source.
    pub fn source_connection(err: tiberius::error::Error) -> Self {
        let (code, state, message) = tiberius_parts(&err);
        MigrateError::SourceConnection {
            code,
            state,
            message,
        }
    }

    /// Wrap a driver error raised while running a source query.
    pub fn source_query(err: tiberius::error::Error) -> Self {
        let (code, state, message) = tiberius_parts(&err);
        MigrateError::SourceQuery {
            code,
            state,
            message,
        }
    }

    /// Create a DestinationProgramming error
    pub fn programming(code: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::DestinationProgramming {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a DestinationLoad error
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::DestinationLoad {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error originated on the source side.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            MigrateError::SourceConnection { .. } | MigrateError::SourceQuery { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::SourceConnection { .. } | MigrateError::SourceQuery { .. } => 2,
            MigrateError::DestinationConnection(_) | MigrateError::Http(_) => 3,
            MigrateError::DestinationProgramming { .. } | MigrateError::DestinationLoad { .. } => 4,
            MigrateError::TablesFailed(_) => 5,
            MigrateError::Io(_) => 7,
            MigrateError::Json(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
