//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.migration.transaction_size == 0 {
        return Err(MigrateError::Config(
            "migration.transaction_size must be at least 1".into(),
        ));
    }
    if config.migration.batch_recalc_interval == 0 {
        return Err(MigrateError::Config(
            "migration.batch_recalc_interval must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }

    Ok(())
}
