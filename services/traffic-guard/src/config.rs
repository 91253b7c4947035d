use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
pub const DEFAULT_LIMIT_BYTES: u64 = 1024 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TrafficGuardConfig {
    pub server_host: String,
    pub server_port: u16,
    pub limit_bytes: u64,
    pub save_interval_secs: u64,
    pub state_file: PathBuf,
    pub alert_command: Option<String>,
    pub alert_webhook: Option<String>,
    pub alert_timeout_secs: u64,
    pub workers: usize,
    pub serve_dir: PathBuf,
    pub status_path: String,
    pub log_level: String,
}

impl Default for TrafficGuardConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8190,
            limit_bytes: DEFAULT_LIMIT_BYTES,
            save_interval_secs: 60,
            state_file: PathBuf::from("data/traffic/traffic.json"),
            alert_command: None,
            alert_webhook: None,
            alert_timeout_secs: 10,
            workers: 1,
            serve_dir: PathBuf::from("public"),
            status_path: "/traffic/status".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl TrafficGuardConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("TRAFFIC_HOST") {
            if !host.trim().is_empty() {
                cfg.server_host = host;
            }
        }
        if let Ok(port) = env::var("TRAFFIC_PORT") {
            cfg.server_port = port.parse().context("TRAFFIC_PORT must be a valid u16")?;
        }
        if let Some(limit) = resolve_limit(
            env::var("TRAFFIC_LIMIT_BYTES").ok().as_deref(),
            env::var("TRAFFIC_LIMIT_GB").ok().as_deref(),
        )? {
            cfg.limit_bytes = limit;
        }
        if let Ok(interval) = env::var("TRAFFIC_SAVE_INTERVAL_SECS") {
            cfg.save_interval_secs = interval
                .parse()
                .context("TRAFFIC_SAVE_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(path) = env::var("TRAFFIC_STATE_FILE") {
            cfg.state_file = PathBuf::from(path);
        }
        cfg.alert_command = non_empty_var("TRAFFIC_ALERT_COMMAND");
        cfg.alert_webhook = non_empty_var("TRAFFIC_ALERT_WEBHOOK");
        if let Ok(timeout) = env::var("TRAFFIC_ALERT_TIMEOUT_SECS") {
            cfg.alert_timeout_secs = timeout
                .parse()
                .context("TRAFFIC_ALERT_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(workers) = env::var("TRAFFIC_WORKERS") {
            cfg.workers = workers
                .parse()
                .context("TRAFFIC_WORKERS must be a positive integer")?;
        }
        if let Ok(dir) = env::var("TRAFFIC_SERVE_DIR") {
            cfg.serve_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("TRAFFIC_STATUS_PATH") {
            cfg.status_path = path;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                cfg.log_level = level;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit_bytes == 0 {
            anyhow::bail!("traffic limit must be greater than zero");
        }
        if self.save_interval_secs == 0 {
            anyhow::bail!("TRAFFIC_SAVE_INTERVAL_SECS must be greater than zero");
        }
        if self.alert_timeout_secs == 0 {
            anyhow::bail!("TRAFFIC_ALERT_TIMEOUT_SECS must be greater than zero");
        }
        if self.workers == 0 {
            anyhow::bail!("TRAFFIC_WORKERS must be greater than zero");
        }
        if self.state_file.as_os_str().is_empty() {
            anyhow::bail!("TRAFFIC_STATE_FILE must not be empty");
        }
        if !self.status_path.starts_with('/') {
            anyhow::bail!("TRAFFIC_STATUS_PATH must start with '/'");
        }

        Ok(())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_timeout_secs)
    }
}

/// Byte ceiling from either `TRAFFIC_LIMIT_BYTES` or `TRAFFIC_LIMIT_GB`
/// (binary GiB). Setting both is rejected.
fn resolve_limit(bytes: Option<&str>, gib: Option<&str>) -> Result<Option<u64>> {
    match (bytes, gib) {
        (Some(_), Some(_)) => {
            anyhow::bail!("set only one of TRAFFIC_LIMIT_BYTES and TRAFFIC_LIMIT_GB")
        }
        (Some(bytes), None) => {
            let limit = bytes
                .parse()
                .context("TRAFFIC_LIMIT_BYTES must be a positive integer")?;
            Ok(Some(limit))
        }
        (None, Some(gib)) => {
            let gib: f64 = gib
                .parse()
                .context("TRAFFIC_LIMIT_GB must be a floating point number")?;
            if gib <= 0.0 {
                anyhow::bail!("TRAFFIC_LIMIT_GB must be greater than zero");
            }
            Ok(Some((gib * BYTES_PER_GIB) as u64))
        }
        (None, None) => Ok(None),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
