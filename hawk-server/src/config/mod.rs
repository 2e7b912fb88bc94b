//! Configuration module for hawk-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hawk_core::config::MonitorSettings;
use hawk_core::transport::ApiCredentials;
use hawk_sdk::config::ObserverSecret;
use thiserror::Error;
use url::Url;

use crate::config::file::{FileConfig, MonitorConfig, TelegramConfig};

pub use crate::config::file::TradeConfig;

/// Environment variable consulted when `[telegram] api_hash` is absent.
pub const API_HASH_ENV: &str = "HAWK_API_HASH";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// The monitor account, validated.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub credentials: ApiCredentials,
    pub phone: String,
    pub session_path: PathBuf,
    /// Session label the gateway stores the login under.
    pub session_label: String,
    pub gateway_url: Url,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub admin: ObserverSecret,
    pub telegram: TelegramSettings,
    pub sources_file: PathBuf,
    pub monitor: MonitorSettings,
    pub trade: Option<TradeConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let api_hash = resolve_api_hash(
            file_config.telegram.api_hash.as_deref(),
            std::env::var(API_HASH_ENV).ok().as_deref(),
        )?;
        validate_monitor(&file_config.monitor)?;
        let telegram = build_telegram(&file_config.telegram, api_hash)?;

        let admin = if file_config.is_admin_secret_hashed() {
            ObserverSecret::from_phc(file_config.admin.secret.as_str())
        } else {
            let secret = ObserverSecret::hash(&file_config.admin.secret)
                .map_err(|e| ConfigError::HashError(e.to_string()))?;
            file_config.admin.secret = secret.as_phc().to_string();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            secret
        };

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            admin,
            telegram,
            sources_file: file_config.monitor.sources_file.clone(),
            monitor: monitor_settings(&file_config.monitor),
            trade: file_config.trade,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn resolve_api_hash(from_file: Option<&str>, from_env: Option<&str>) -> Result<String, ConfigError> {
    from_file
        .or(from_env)
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "telegram.api_hash is not set and {API_HASH_ENV} is empty"
            ))
        })
}

fn validate_monitor(monitor: &MonitorConfig) -> Result<(), ConfigError> {
    if monitor.history_limit == 0 {
        return Err(ConfigError::ValidationError(
            "monitor.history_limit must be at least 1".to_string(),
        ));
    }
    if monitor.history_interval_secs == 0 || monitor.keep_alive_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "monitor intervals must be at least one second".to_string(),
        ));
    }
    Ok(())
}

fn build_telegram(
    telegram: &TelegramConfig,
    api_hash: String,
) -> Result<TelegramSettings, ConfigError> {
    if telegram.phone.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "telegram.phone must not be empty".to_string(),
        ));
    }
    let session_label = telegram
        .session_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "telegram.session_path {:?} has no file name",
                telegram.session_path
            ))
        })?
        .to_owned();

    Ok(TelegramSettings {
        credentials: ApiCredentials {
            api_id: telegram.api_id,
            api_hash,
        },
        phone: telegram.phone.trim().to_owned(),
        session_path: telegram.session_path.clone(),
        session_label,
        gateway_url: telegram.gateway_url.clone(),
    })
}

fn monitor_settings(monitor: &MonitorConfig) -> MonitorSettings {
    MonitorSettings {
        history_interval: Duration::from_secs(monitor.history_interval_secs),
        history_limit: monitor.history_limit,
        keep_alive_interval: Duration::from_secs(monitor.keep_alive_interval_secs),
        extraction: monitor.extraction,
        dispatch_grace: Duration::from_secs(monitor.dispatch_grace_secs),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
