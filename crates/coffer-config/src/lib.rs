//! # coffer-config
//!
//! Configuration management for Coffer.
//!
//! Loads configuration from:
//! 1. `~/.coffer/config.toml` (global)
//! 2. `.coffer/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

/// Blob root directory override
pub const ENV_ROOT: &str = "COFFER_ROOT";
/// Entry database directory override
pub const ENV_DB: &str = "COFFER_DB";
/// Owner id override
pub const ENV_OWNER: &str = "COFFER_OWNER";
/// Owner key file override
pub const ENV_KEY_FILE: &str = "COFFER_KEY_FILE";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub owner: OwnerConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(Self::project_config_path()))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load and layer the given config files, skipping any that do not
    /// exist. Keys set in `project` replace those from `global`; tables are
    /// merged key by key. Environment variables are not consulted.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut table = toml::Table::new();
        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                merge_tables(&mut table, toml::from_str(&contents)?);
            }
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Global config path: ~/.coffer/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".coffer/config.toml"))
    }

    /// Project config path, relative to the working directory
    pub fn project_config_path() -> &'static Path {
        Path::new(".coffer/config.toml")
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_ROOT) {
            self.storage.root = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_DB) {
            self.storage.db = PathBuf::from(path);
        }
        if let Some(id) = lookup(ENV_OWNER) {
            self.owner.id = id.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_OWNER,
                value: id.clone(),
            })?;
        }
        if let Some(path) = lookup(ENV_KEY_FILE) {
            self.owner.key_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}

/// `~/.coffer`, or `.coffer` if there is no home directory
fn coffer_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".coffer"))
        .unwrap_or_else(|| PathBuf::from(".coffer"))
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Blob root directory; must exist before use
    pub root: PathBuf,
    /// LMDB entry database directory; created on first use
    pub db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = coffer_home();
        Self {
            root: home.join("blobs"),
            db: home.join("entries.lmdb"),
        }
    }
}

/// Owner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerConfig {
    /// Owner id that partitions blobs and entries
    pub id: i64,
    /// File holding the owner's hex-encoded AES-256 key. Unset means
    /// content is stored unencrypted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}
