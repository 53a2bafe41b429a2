use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::credentials::PasswordStorage;

/// Top-level configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Primary database configuration
    #[serde(default)]
    pub mongodb: MongoConfig,

    /// Local fallback storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential handling
    #[serde(default)]
    pub security: SecurityConfig,
}

/// MongoDB connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MongoConfig {
    /// Whether to attempt a connection at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Connection string, including credentials and options
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Database name
    #[serde(default = "default_database")]
    pub database: String,

    /// Timeout for establishing a connection in seconds
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for selecting a server in seconds
    #[serde(default = "default_timeout")]
    pub server_selection_timeout_secs: u64,

    /// Application name reported to the server
    #[serde(default)]
    pub app_name: Option<String>,
}

/// Local storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the record files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Persist recommendations to files while in fallback mode
    #[serde(default = "default_enabled")]
    pub durable_fallback: bool,
}

/// Credential configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// How user passwords are stored
    #[serde(default)]
    pub password_storage: PasswordStorage,

    /// Work factor when passwords are hashed
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

// Default values for optional configuration
fn default_enabled() -> bool {
    true
}

fn default_connection_string() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "smart_farming".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            connection_string: default_connection_string(),
            database: default_database(),
            connect_timeout_secs: default_timeout(),
            server_selection_timeout_secs: default_timeout(),
            app_name: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            durable_fallback: default_enabled(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            password_storage: PasswordStorage::default(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&config_text)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Load the file if it exists, fall back to defaults otherwise, then apply the environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Override connection settings from `MONGODB_URI` and `MONGODB_DB`
    pub fn apply_env(&mut self) {
        if let Ok(uri) = env::var("MONGODB_URI") {
            self.mongodb.connection_string = uri;
        }
        if let Ok(database) = env::var("MONGODB_DB") {
            self.mongodb.database = database;
        }
    }

    /// Configuration that never touches the network, storing under `data_dir`
    pub fn offline(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            mongodb: MongoConfig {
                enabled: false,
                ..MongoConfig::default()
            },
            storage: StorageConfig {
                data_dir: data_dir.into(),
                durable_fallback: true,
            },
            security: SecurityConfig::default(),
        }
    }
}
