use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Root data directory for dispatchd.
/// Unix: `~/.dispatchd`, overridable with `DISPATCHD_DATA_DIR`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DISPATCHD_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .expect("Could not find home directory")
        .join(".dispatchd")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_project_path: String,
    pub default_model: String,
    pub executor: ExecutorConfig,
    pub rate_limit: RateLimitConfig,
    pub task_queue: TaskQueueConfig,
    pub webhook: WebhookConfig,
    pub statistics: StatisticsConfig,
    pub session_retention_days: u32,
    pub task_retention_days: u32,
    pub log_file: Option<String>,
    pub log_level: String,
    pub pid_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18990,
            default_project_path: "/tmp".to_string(),
            default_model: "claude-sonnet-4-5".to_string(),
            executor: ExecutorConfig::default(),
            rate_limit: RateLimitConfig::default(),
            task_queue: TaskQueueConfig::default(),
            webhook: WebhookConfig::default(),
            statistics: StatisticsConfig::default(),
            session_retention_days: 30,
            task_retention_days: 30,
            log_file: None,
            log_level: "info".to_string(),
            pid_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Command used to invoke the executor tool.
    pub command: String,
    /// Wall-clock ceiling for a single direct invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: 60_000,
            max_requests: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    pub concurrency: usize,
    pub default_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            default_timeout_secs: 300,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub default_url: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_url: None,
            timeout_secs: 10,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub enabled: bool,
    pub collection_interval_secs: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_secs: 300,
        }
    }
}

impl Config {
    /// Load `config.json` from the data directory. A missing file yields the
    /// defaults; a file that exists but does not parse is a fatal start error.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.json");
        let config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let parsed: Config = serde_json::from_str(&raw)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
            info!("Loaded configuration from {}", path.display());
            parsed
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_queue.concurrency == 0 {
            return Err(anyhow!("task_queue.concurrency must be at least 1"));
        }
        if self.task_queue.default_timeout_secs == 0 {
            return Err(anyhow!("task_queue.default_timeout_secs must be at least 1"));
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be at least 1"));
        }
        if let Some(url) = &self.webhook.default_url {
            url::Url::parse(url).map_err(|e| anyhow!("webhook.default_url is invalid: {}", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("defaults validate");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        config.task_queue.default_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.task_queue.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_default_webhook_url_is_rejected() {
        let mut config = Config::default();
        config.webhook.default_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"port": 9999, "task_queue": {"concurrency": 5}}"#,
        )
        .expect("write config");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.port, 9999);
        assert_eq!(config.task_queue.concurrency, 5);
        assert_eq!(config.task_queue.default_timeout_secs, 300);
        assert_eq!(config.host, "127.0.0.1");
    }
}
