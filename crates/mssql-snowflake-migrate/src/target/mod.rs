//! Snowflake destination.
//!
//! - [`ddl`]: CREATE OR REPLACE / INSERT / TRUNCATE statement generation
//! - [`snowflake`]: session client implementing the destination traits
//! - [`auth`]: password, OAuth and external-browser SSO login

pub mod auth;
pub mod ddl;
pub mod snowflake;

pub use auth::{AuthMode, SsoPrompt};
pub use ddl::create_or_replace_table;
pub use snowflake::{SnowflakeConnector, SnowflakeSession};
