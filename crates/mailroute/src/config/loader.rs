use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admin::looks_like_email;
use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Longest accepted polling interval.
const MAX_CHECK_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Proxy variables consulted, in order, when no proxy is configured.
const PROXY_ENV_FALLBACKS: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

/// Returns the conventional config file location: `~/.mailroute/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mailroute").join("config.json"))
}

/// Loads a config file, applies environment overrides and validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Parses and validates a config document without consulting the environment.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse_config(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    Ok(serde_json::from_value(json_value)?)
}

/// Applies the deployment environment variables on top of `config`, then
/// re-validates it.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_env_overrides_from(config, |name| std::env::var(name).ok())?;
    validate_config(config)
}

/// Applies overrides read through `lookup`. Empty values are ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `CHECK_INTERVAL` | `intake.check_interval_secs` (e.g. `5m`, `30s`, `1h`) |
/// | `MAX_EMAILS_PER_BATCH` | `intake.batch_size` |
/// | `MAX_BATCHES` | `intake.max_batches` |
/// | `GMAIL_USER_EMAIL` | `gmail.user_email` |
/// | `MAILROUTE_DATABASE` | `database.path` |
/// | `MAILROUTE_PROXY` | `gmail.proxy` |
/// | `HTTPS_PROXY`, `HTTP_PROXY` | `gmail.proxy`, only when still unset |
pub fn apply_env_overrides_from<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(value) = get("CHECK_INTERVAL") {
        let interval = parse_duration(&value).map_err(|reason| ConfigError::InvalidEnv {
            name: "CHECK_INTERVAL".to_string(),
            value: value.clone(),
            reason,
        })?;
        config.intake.check_interval_secs = interval.as_secs();
    }
    if let Some(value) = get("MAX_EMAILS_PER_BATCH") {
        config.intake.batch_size = parse_number("MAX_EMAILS_PER_BATCH", &value)?;
    }
    if let Some(value) = get("MAX_BATCHES") {
        config.intake.max_batches = parse_number("MAX_BATCHES", &value)?;
    }
    if let Some(value) = get("GMAIL_USER_EMAIL") {
        config.gmail.user_email = value;
    }
    if let Some(value) = get("MAILROUTE_DATABASE") {
        config.database.path = Some(value);
    }

    if let Some(value) = get("MAILROUTE_PROXY") {
        config.gmail.proxy = Some(value);
    } else if config.gmail.proxy.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = PROXY_ENV_FALLBACKS.iter().find_map(|name| get(name)) {
            config.gmail.proxy = Some(value);
        }
    }

    Ok(())
}

fn parse_number(name: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|e| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parses durations such as `300`, `30s`, `5m`, `1h30m` or `500ms`.
/// A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number at '{}'", rest));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("invalid number '{}': {}", &rest[..digits], e))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Some(Duration::from_millis(amount)),
            "s" => Some(Duration::from_secs(amount)),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "h" => amount.checked_mul(3600).map(Duration::from_secs),
            "" => return Err(format!("missing unit after '{}'", amount)),
            other => return Err(format!("unknown unit '{}'", other)),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| format!("duration '{}' is too large", input))?;
    }

    Ok(total)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.intake.check_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "intake.check_interval_secs must be positive".to_string(),
        });
    }

    if config.intake.check_interval_secs > MAX_CHECK_INTERVAL_SECS {
        return Err(ConfigError::Validation {
            message: format!(
                "intake.check_interval_secs must be at most {} (one week)",
                MAX_CHECK_INTERVAL_SECS
            ),
        });
    }

    if config.intake.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "intake.concurrency must be positive".to_string(),
        });
    }

    if !config.gmail.user_email.is_empty() && !looks_like_email(&config.gmail.user_email) {
        return Err(ConfigError::Validation {
            message: format!(
                "gmail.user_email '{}' is not an email address",
                config.gmail.user_email
            ),
        });
    }

    Ok(())
}
