pub mod settings;

pub use settings::{Config, ConfigError, GotConfig, LogConfig, LoggingConfig};
