//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, LogFormat, LogOutput, LoggingConfig, StorageBackend, StorageConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_storage(&config.storage)?;

    if config.relay.max_workers == 0 {
        return Err(ConfigError::validation("relay.max_workers must be greater than 0"));
    }
    if config.runtime.event_buffer == 0 {
        return Err(ConfigError::validation("runtime.event_buffer must be greater than 0"));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "logging.format \"json\" requires the json-log feature",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter target: {target:?}"
        )));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> ConfigResult<()> {
    if storage.backend != StorageBackend::File {
        return Ok(());
    }

    let name = storage.file_name.trim();
    if name.is_empty() {
        return Err(ConfigError::validation("storage.file_name cannot be empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(ConfigError::validation(
            "storage.file_name must be a file name, not a path",
        ));
    }

    Ok(())
}
