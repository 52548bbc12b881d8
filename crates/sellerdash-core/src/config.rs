use crate::app_config::{AppConfig, Environment};
use crate::registry::{DEFAULT_RETURN_CARRIERS, DEFAULT_RETURN_CENTERS, DEFAULT_TRACKING_PREFIXES};
use crate::ConfigError;

/// Default rows per ingestion chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so they
/// can be exercised with a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        parse_flag(&raw).ok_or_else(|| invalid(var, format!("expected true/false, got {raw:?}")))
    };

    let parse_list = |var: &str, default: &[&str]| -> Result<Vec<String>, ConfigError> {
        match lookup(var) {
            Ok(raw) => {
                let items = split_list(&raw);
                if items.is_empty() {
                    return Err(invalid(var, "list must not be empty".to_string()));
                }
                Ok(items)
            }
            Err(_) => Ok(default.iter().map(|s| (*s).to_string()).collect()),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SELLERDASH_ENV", "development"));
    let log_level = or_default("SELLERDASH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SELLERDASH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SELLERDASH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SELLERDASH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let chunk_size = parse_usize("SELLERDASH_CHUNK_SIZE", &DEFAULT_CHUNK_SIZE.to_string())?;
    if chunk_size == 0 {
        return Err(invalid("SELLERDASH_CHUNK_SIZE", "must be at least 1".to_string()));
    }
    let max_upload_bytes = parse_u64(
        "SELLERDASH_MAX_UPLOAD_BYTES",
        &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
    )?;
    let count_rows = parse_bool("SELLERDASH_COUNT_ROWS", "true")?;
    let reject_duplicate_uploads = parse_bool("SELLERDASH_REJECT_DUPLICATE_UPLOADS", "false")?;
    let error_digest_limit = parse_usize("SELLERDASH_ERROR_DIGEST_LIMIT", "20")?;

    let return_centers = parse_list("SELLERDASH_RETURN_CENTERS", DEFAULT_RETURN_CENTERS)?;
    let return_carriers = parse_list("SELLERDASH_RETURN_CARRIERS", DEFAULT_RETURN_CARRIERS)?;
    let tracking_prefixes = parse_list("SELLERDASH_TRACKING_PREFIXES", DEFAULT_TRACKING_PREFIXES)?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        chunk_size,
        max_upload_bytes,
        count_rows,
        reject_duplicate_uploads,
        error_digest_limit,
        return_centers,
        return_carriers,
        tracking_prefixes,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
