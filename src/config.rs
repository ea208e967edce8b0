//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "sitback";
const CONFIG_FILE: &str = "config.yaml";
const DB_FILE: &str = "sitback.db";

/// Top-level configuration for the `sb` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub claim: ClaimConfig,

    #[serde(default)]
    pub list: ListConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Lease length used when `--lease-minutes` is not given.
    #[serde(default = "default_lease_minutes")]
    pub lease_minutes: i64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            lease_minutes: default_lease_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Row limit for `sb todo get` when `--num` is not given.
    #[serde(default = "default_list_limit")]
    pub default_limit: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: default_list_limit(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> PathBuf {
    config_dir().join(DB_FILE)
}

fn default_busy_timeout() -> u64 {
    crate::db::DEFAULT_BUSY_TIMEOUT_MS
}

fn default_lease_minutes() -> i64 {
    15
}

fn default_list_limit() -> usize {
    20
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from an explicit path, or the default location if it exists, then
    /// apply environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SITBACK_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("SITBACK_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }

        if let Some(minutes) = lookup("SITBACK_LEASE_MINUTES") {
            self.claim.lease_minutes = minutes
                .trim()
                .parse()
                .with_context(|| format!("SITBACK_LEASE_MINUTES={} is not an integer", minutes))?;
        }

        if let Some(timeout) = lookup("SITBACK_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("SITBACK_BUSY_TIMEOUT_MS={} is not an integer", timeout))?;
        }

        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        Ok(())
    }
}
