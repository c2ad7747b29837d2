//! Tracing subscriber setup.

use crate::{ConfigError, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, then the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::LoggingError(format!("invalid level '{}': {e}", config.level))),
    }
}

/// Install the global fmt subscriber.
///
/// Fails if the level is not a valid filter directive or a global
/// subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ConfigError::LoggingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "inkweave=verbose".into(),
            json: false,
        };
        assert!(matches!(env_filter(&config), Err(ConfigError::LoggingError(_))));
    }

    #[test]
    fn accepts_directive_list() {
        let config = LoggingConfig {
            level: "info,inkweave_engine=debug".into(),
            json: true,
        };
        assert!(env_filter(&config).is_ok());
    }
}
