//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::traits::DEFAULT_BATCH_SIZE;
use crate::pipeline::TableJob;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Destination warehouse configuration (Snowflake).
    pub destination: DestinationConfig,

    /// Migration behavior and worklist.
    pub migration: MigrationConfig,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// ADO.NET connection string, e.g.
    /// `Server=tcp:host,1433;Database=Data_Lab;User Id=etl;Password=...`.
    pub connection_string: String,

    /// TCP connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field(
                "connection_string",
                &redact_connection_string(&self.connection_string),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// How the destination session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authenticator {
    /// User name and password.
    Snowflake,

    /// OAuth access token.
    Oauth,

    /// Browser-based SSO through the identity provider.
    #[default]
    Externalbrowser,
}

/// Destination warehouse (Snowflake) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Account identifier, e.g. `xy12345.eu-west-1` or `myorg-myaccount`.
    pub account: String,

    /// Login name.
    pub user: String,

    /// Destination database.
    pub database: String,

    /// Destination schema.
    pub schema: String,

    /// Virtual warehouse used for DDL and loads.
    pub warehouse: String,

    /// Role to assume (default: the user's default role).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Override of `<account>.snowflakecomputing.com`, with or without scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Authentication method (default: externalbrowser).
    #[serde(default)]
    pub authenticator: Authenticator,

    /// Password, for `authenticator: snowflake`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Access token, for `authenticator: oauth`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request HTTP timeout in seconds (default: 300).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long to wait for the SSO browser redirect (default: 120).
    #[serde(default = "default_sso_timeout_secs")]
    pub sso_timeout_secs: u64,

    /// Local port for the SSO redirect listener (default: 0, any free port).
    #[serde(default)]
    pub sso_redirect_port: u16,
}

impl DestinationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sso_timeout(&self) -> Duration {
        Duration::from_secs(self.sso_timeout_secs)
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("host", &self.host)
            .field("authenticator", &self.authenticator)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("sso_timeout_secs", &self.sso_timeout_secs)
            .field("sso_redirect_port", &self.sso_redirect_port)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per bulk-load batch (default: 50000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Empty destination tables before loading (default: true).
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Tables to migrate, in order.
    #[serde(default)]
    pub tables: Vec<TableJob>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            overwrite: true,
            tables: Vec::new(),
        }
    }
}

/// Replace password values in an ADO.NET connection string.
pub fn redact_connection_string(conn: &str) -> String {
    conn.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if matches!(
                    key.trim().to_ascii_lowercase().as_str(),
                    "password" | "pwd"
                ) =>
            {
                format!("{}=[REDACTED]", key)
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

// Default value functions for serde
fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_sso_timeout_secs() -> u64 {
    120
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
