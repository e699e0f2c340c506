mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LoggingSettings, Settings};

/// Loads the configuration from the default file and environment variables.
///
/// Values present in `config/default.{toml,json,yaml}` or in `AASB_*`
/// environment variables override the defaults one field at a time.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("AASB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            message_timeout_ms: partial
                .broker
                .as_ref()
                .and_then(|b| b.message_timeout_ms)
                .unwrap_or(default.broker.message_timeout_ms),
            executor_name_prefix: partial
                .broker
                .as_ref()
                .and_then(|b| b.executor_name_prefix.clone())
                .unwrap_or(default.broker.executor_name_prefix),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
