//! Configuration loading
//!
//! Resolution priority for every setting:
//! 1. Command-line argument / environment variable (resolved by the binary's clap parser)
//! 2. TOML config file
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3001;

/// Default leadership auto-approve timeout in seconds
pub const DEFAULT_AUTO_APPROVE_SECS: u64 = 30;

/// Default maximum time spent retrying a locked database
pub const DEFAULT_DB_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub tos_path: PathBuf,
    pub auto_approve_secs: u64,
    pub db_max_lock_wait_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            database_path: default_database_path(),
            tos_path: PathBuf::from("tos.md"),
            auto_approve_secs: DEFAULT_AUTO_APPROVE_SECS,
            db_max_lock_wait_ms: DEFAULT_DB_MAX_LOCK_WAIT_MS,
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub tos_path: Option<PathBuf>,
    pub auto_approve_secs: Option<u64>,
    pub db_max_lock_wait_ms: Option<u64>,
}

/// On-disk TOML layout; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub tos_path: Option<PathBuf>,
    pub auto_approve_secs: Option<u64>,
    pub db_max_lock_wait_ms: Option<u64>,
}

impl FileConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// Resolve the server configuration
///
/// `config_file` is an explicitly requested file (must exist). When `None`, the
/// platform config file is used if present.
pub fn resolve_config(overrides: ConfigOverrides, config_file: Option<&Path>) -> Result<ServerConfig> {
    let file = match config_file {
        Some(path) => {
            info!("Loading config file: {}", path.display());
            FileConfig::load(path)?
        }
        None => match default_config_file() {
            Some(path) => {
                info!("Loading config file: {}", path.display());
                FileConfig::load(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                FileConfig::default()
            }
        },
    };

    let defaults = ServerConfig::default();

    let database_path = overrides
        .database
        .or(file.database)
        .map(|db| normalize_database_path(&db))
        .unwrap_or(defaults.database_path);

    let config = ServerConfig {
        host: overrides.host.or(file.host).unwrap_or(defaults.host),
        port: overrides.port.or(file.port).unwrap_or(defaults.port),
        database_path,
        tos_path: overrides.tos_path.or(file.tos_path).unwrap_or(defaults.tos_path),
        auto_approve_secs: overrides
            .auto_approve_secs
            .or(file.auto_approve_secs)
            .unwrap_or(defaults.auto_approve_secs),
        db_max_lock_wait_ms: overrides
            .db_max_lock_wait_ms
            .or(file.db_max_lock_wait_ms)
            .unwrap_or(defaults.db_max_lock_wait_ms),
    };

    if config.auto_approve_secs == 0 {
        return Err(Error::Config("auto_approve_secs must be greater than zero".to_string()));
    }

    Ok(config)
}

/// Accept either a plain path or a `sqlite://` URL
pub fn normalize_database_path(value: &str) -> PathBuf {
    let trimmed = value
        .strip_prefix("sqlite://")
        .or_else(|| value.strip_prefix("sqlite:"))
        .unwrap_or(value);
    let without_query = trimmed.split('?').next().unwrap_or(trimmed);
    PathBuf::from(without_query)
}

/// Platform config file, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("setlist").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/setlist/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("setlist").join("setlist.db"))
        .unwrap_or_else(|| PathBuf::from("./setlist_data/setlist.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sqlite_url() {
        assert_eq!(
            normalize_database_path("sqlite:///var/lib/setlist.db?mode=rwc"),
            PathBuf::from("/var/lib/setlist.db")
        );
        assert_eq!(normalize_database_path("data.db"), PathBuf::from("data.db"));
    }

    #[test]
    fn test_defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.auto_approve_secs, 30);
    }
}
