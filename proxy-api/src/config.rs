use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_storage_api_host")]
    pub storage_api_host: String,

    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> String {
    std::env::var("PROXY_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
}

fn default_db_path() -> PathBuf {
    std::env::var("PROXY_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data").join("credentials.db"))
}

fn default_storage_api_host() -> String {
    std::env::var("STORAGE_API_HOST").unwrap_or_else(|_| "connection.keboola.com".to_string())
}

fn default_lock_timeout() -> u64 {
    std::env::var("PROXY_LOCK_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

fn default_request_timeout() -> u64 {
    std::env::var("PROXY_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

fn default_log_level() -> String {
    std::env::var("LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| "info".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            storage_api_host: default_storage_api_host(),
            lock_timeout_secs: default_lock_timeout(),
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Default tracing directive when `RUST_LOG` is not set
    pub fn log_filter(&self) -> String {
        let level = &self.log_level;
        format!("proxy_api={level},proxy_orchestrator={level},tower_http={level}")
    }
}
