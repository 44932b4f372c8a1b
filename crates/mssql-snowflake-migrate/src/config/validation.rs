//! Configuration validation.

use super::{Authenticator, Config};
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.connection_string.trim().is_empty() {
        return Err(MigrateError::Config(
            "source.connection_string is required".into(),
        ));
    }

    // Destination validation
    let dest = &config.destination;
    for (field, value) in [
        ("account", &dest.account),
        ("user", &dest.user),
        ("database", &dest.database),
        ("schema", &dest.schema),
        ("warehouse", &dest.warehouse),
    ] {
        if value.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "destination.{} is required",
                field
            )));
        }
    }
    validate_identifier(&dest.database)?;
    validate_identifier(&dest.schema)?;

    match dest.authenticator {
        Authenticator::Snowflake if dest.password.as_deref().unwrap_or("").is_empty() => {
            return Err(MigrateError::Config(
                "destination.password is required when authenticator is 'snowflake'".into(),
            ));
        }
        Authenticator::Oauth if dest.token.as_deref().unwrap_or("").is_empty() => {
            return Err(MigrateError::Config(
                "destination.token is required when authenticator is 'oauth'".into(),
            ));
        }
        _ => {}
    }

    if dest.request_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "destination.request_timeout_secs must be at least 1".into(),
        ));
    }

    // Migration validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.tables.is_empty() {
        return Err(MigrateError::Config(
            "migration.tables must list at least one table".into(),
        ));
    }
    for (idx, job) in config.migration.tables.iter().enumerate() {
        if job.source.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "migration.tables[{}].source is required",
                idx
            )));
        }
        validate_identifier(&job.destination).map_err(|e| {
            MigrateError::Config(format!("migration.tables[{}].destination: {}", idx, e))
        })?;
    }

    Ok(())
}
