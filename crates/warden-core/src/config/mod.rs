//! Configuration management with file persistence

use crate::domain::session::{DEFAULT_LIST_LIMIT, RepositoryOptions};
use crate::kms::{Kms, LocalKms};
use crate::storage::{DatabaseConfig, default_database_path};
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the base64 kms master key
pub const KMS_KEY_ENV: &str = "WARDEN_KMS_KEY";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "WARDEN_CONFIG_DIR";

/// Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: StorageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub kms: KmsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; the platform data directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    pub default_list_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KmsConfig {
    #[serde(skip)]
    pub master_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warden_core=info".to_string(),
        }
    }
}

impl KmsConfig {
    pub fn resolved_master_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(env::var(KMS_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
    }

    /// Key id of the configured master key, never the key itself
    pub fn redacted_master_key(&self) -> anyhow::Result<Option<String>> {
        match self.resolved_master_key()? {
            Some(key) => Ok(Some(
                LocalKms::from_base64(&key)
                    .map(|kms| kms.key_id().to_string())
                    .unwrap_or_else(|_| "(invalid)".to_string()),
            )),
            None => Ok(None),
        }
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.master_key.is_some() {
            return Err(anyhow!(
                "Kms master keys must be provided via the {} environment variable, not stored in configuration",
                KMS_KEY_ENV
            ));
        }
        Ok(())
    }

    /// Build the local kms from the environment
    pub fn local_kms(&self) -> anyhow::Result<LocalKms> {
        let key = self
            .resolved_master_key()?
            .ok_or_else(|| anyhow!("{} is not set", KMS_KEY_ENV))?;
        LocalKms::from_base64(&key).with_context(|| format!("Invalid {}", KMS_KEY_ENV))
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("warden")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be positive"));
        }
        if self.sessions.default_list_limit <= 0 {
            return Err(anyhow!(
                "sessions.default_list_limit must be positive, got {}",
                self.sessions.default_list_limit
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(anyhow!("logging.filter must not be empty"));
        }
        self.kms.enforce_env_only()
    }

    /// Storage settings as a database config
    pub fn database_config(&self) -> DatabaseConfig {
        let path = self
            .database
            .path
            .clone()
            .unwrap_or_else(default_database_path);
        DatabaseConfig::with_path(path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    /// Session settings as repository options
    pub fn repository_options(&self) -> RepositoryOptions {
        RepositoryOptions::default().with_default_limit(self.sessions.default_list_limit)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Storage settings
            "database.path" => Ok(self
                .database
                .path
                .clone()
                .unwrap_or_else(default_database_path)
                .display()
                .to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "database.busy_timeout_secs" => Ok(self.database.busy_timeout_secs.to_string()),

            // Session settings
            "sessions.default_list_limit" => Ok(self.sessions.default_list_limit.to_string()),

            // Logging settings
            "logging.filter" => Ok(self.logging.filter.clone()),

            // Master key (special handling - show key id only)
            "kms.master_key" => match self.kms.redacted_master_key()? {
                Some(key_id) => Ok(key_id),
                None => Ok(format!("(not set - use {} env var)", KMS_KEY_ENV)),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `warden config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be positive"));
                }
                self.database.max_connections = max;
            }
            "database.busy_timeout_secs" => {
                self.database.busy_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid busy_timeout_secs value: {}", value))?;
            }
            "sessions.default_list_limit" => {
                let limit: i64 = value
                    .parse()
                    .with_context(|| format!("Invalid default_list_limit value: {}", value))?;
                if limit <= 0 {
                    return Err(anyhow!("default_list_limit must be positive"));
                }
                self.sessions.default_list_limit = limit;
            }
            "logging.filter" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("logging.filter must not be empty"));
                }
                self.logging.filter = value.to_string();
            }

            // Master key cannot be set via config
            "kms.master_key" => {
                return Err(anyhow!(
                    "Master keys cannot be stored in configuration for security. \
                     Set the {} environment variable instead.",
                    KMS_KEY_ENV
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `warden config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "database.path",
            "database.max_connections",
            "database.busy_timeout_secs",
            "sessions.default_list_limit",
            "logging.filter",
            "kms.master_key",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
