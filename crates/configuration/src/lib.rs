use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{DatabaseSettings, LogLevel, LoggingSettings, Settings, TriggerSettings};

/// The file looked up by `load_config`, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "acumen.toml";

/// Loads the application configuration from `acumen.toml`.
///
/// This function is the primary entry point for this crate. The file is
/// optional; every value has a default and can be overridden from the
/// environment (`ACUMEN_DATABASE__MAX_CONNECTIONS=20`). `DATABASE_URL`
/// takes precedence over `database.url`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Like `load_config`, reading the file at `path` instead.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("ACUMEN")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let mut settings = builder.try_deserialize::<Settings>()?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        settings.database.url = url;
    }

    validate(&settings)?;
    tracing::debug!(path = %path.display(), "Configuration loaded.");
    Ok(settings)
}

/// Rejects settings that would only fail later, at connection or spawn time.
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }
    if settings.database.acquire_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "database.acquire_timeout_secs must be at least 1".to_string(),
        ));
    }
    if settings.trigger.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "trigger.channel_capacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}
