pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, apply_env_overrides_from, default_config_path, load_config,
    load_config_from_str, parse_duration,
};
pub use schema::{Config, DatabaseConfig, GmailConfig, IntakeConfig, LogFormat, LoggingConfig};
