//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports TOML and JSON formats
//!
//! ## Environment Variables
//! - `UMBONO_DB_PATH`: Database file path
//! - `UMBONO_DB_POOL_SIZE`: Connection pool size
//! - `UMBONO_SHARING_SCHEDULE`: Cron expression for the sharing job
//! - `UMBONO_SHARING_BATCH_SIZE`: Rows per reconciliation batch
//! - `UMBONO_SHARING_MAX_INTERVAL_HOURS`: Pass window in hours
//! - `UMBONO_SHARING_LOCK_BUFFER_MINUTES`: Lock lease safety buffer
//! - `UMBONO_SHARING_MAX_RETRY_ATTEMPTS`: Retry budget (0 = forever)
//! - `UMBONO_PARTNERS`: Comma-separated partner names, all actions enabled
//!
//! ## File Locations
//! The loader probes `./config.toml`, `./umbono.toml` (and `.json`
//! variants), then the same names in the parent directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use umbono_domain::{
    Config, DatabaseConfig, Partner, PartnerSettings, Result, SharingJobConfig, UmbonoError,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. Returns an error
/// if any are missing; see module documentation for the complete list.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("UMBONO_DB_PATH")?;
    let db_pool_size = parse_env::<u32>("UMBONO_DB_POOL_SIZE")?;

    let schedule = env_var("UMBONO_SHARING_SCHEDULE")?;
    let batch_size = parse_env::<usize>("UMBONO_SHARING_BATCH_SIZE")?;
    let max_interval_hours = parse_env::<u32>("UMBONO_SHARING_MAX_INTERVAL_HOURS")?;
    let lock_buffer_minutes = parse_env::<u32>("UMBONO_SHARING_LOCK_BUFFER_MINUTES")?;
    let max_retry_attempts = parse_env::<u32>("UMBONO_SHARING_MAX_RETRY_ATTEMPTS")?;

    let partners = match std::env::var("UMBONO_PARTNERS") {
        Ok(raw) => parse_partner_list(&raw)?,
        Err(_) => Vec::new(),
    };

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        sharing: SharingJobConfig {
            schedule,
            batch_size,
            max_interval_hours,
            lock_buffer_minutes,
            max_retry_attempts,
        },
        partners,
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by file extension (TOML or JSON).
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(UmbonoError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            UmbonoError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| UmbonoError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(contents)
            .map_err(|e| UmbonoError::Config(format!("Invalid TOML config: {e}"))),
        Some("json") => serde_json::from_str(contents)
            .map_err(|e| UmbonoError::Config(format!("Invalid JSON config: {e}"))),
        other => Err(UmbonoError::Config(format!(
            "Unsupported config format: {:?} ({})",
            other,
            path.display()
        ))),
    }
}

fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: [&str; 4] = ["config.toml", "config.json", "umbono.toml", "umbono.json"];

    for base in [PathBuf::from("."), PathBuf::from("..")] {
        for name in CANDIDATES {
            let candidate = base.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| UmbonoError::Config(format!("Missing environment variable: {name}")))
}

fn parse_env<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)?
        .parse::<T>()
        .map_err(|e| UmbonoError::Config(format!("Invalid {name}: {e}")))
}

fn parse_partner_list(raw: &str) -> Result<Vec<PartnerSettings>> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let partner = Partner::from_str(name)
                .map_err(|e| UmbonoError::Config(format!("Invalid partner: {e}")))?;
            Ok(PartnerSettings {
                partner,
                active: true,
                create_enabled: true,
                update_enabled: true,
                delete_enabled: true,
            })
        })
        .collect()
}
