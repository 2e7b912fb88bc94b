//! TOML file configuration structures.
//!
//! These structs directly map to the `hawk-config.toml` file format.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use hawk_core::address::ExtractionMode;
use hawk_sdk::config::ObserverSecret;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub telegram: TelegramConfig,
    pub monitor: MonitorConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<TradeConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Chat network account the monitor runs as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_id: i32,
    /// Falls back to the `HAWK_API_HASH` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_hash: Option<String>,
    pub phone: String,
    /// Session record written after a successful login. Its file stem is the
    /// session label used with the gateway.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    /// Root URL of the chat gateway.
    pub gateway_url: Url,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("./hawk_monitor.session")
}

/// Monitoring engine section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Newline-delimited list of chat handles or `t.me` links.
    pub sources_file: PathBuf,
    #[serde(default = "default_history_interval_secs")]
    pub history_interval_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,
    #[serde(default)]
    pub extraction: ExtractionMode,
    #[serde(default = "default_dispatch_grace_secs")]
    pub dispatch_grace_secs: u64,
}

fn default_history_interval_secs() -> u64 {
    hawk_core::config::DEFAULT_HISTORY_INTERVAL.as_secs()
}

fn default_history_limit() -> u32 {
    hawk_core::config::DEFAULT_HISTORY_LIMIT
}

fn default_keep_alive_interval_secs() -> u64 {
    hawk_core::config::DEFAULT_KEEP_ALIVE_INTERVAL.as_secs()
}

fn default_dispatch_grace_secs() -> u64 {
    hawk_core::config::DEFAULT_DISPATCH_GRACE.as_secs()
}

/// Downstream trade webhook. Without this section nothing is traded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    pub webhook_url: Url,
    /// HMAC key for the `Hawk-Signature` header.
    pub secret: String,
    /// Amount of SOL per trade.
    pub amount: Decimal,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        ObserverSecret::looks_hashed(&self.admin.secret)
    }
}
