use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;
use tracing::info;

use super::dispatcher::AlertEvent;
use super::error::AlertError;

/// External mechanism notified when the traffic ceiling is crossed.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Runs a local command. The command needs no arguments; usage details are
/// exported as `TRAFFIC_*` environment variables.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSink {
    pub fn parse(command_line: &str, timeout: Duration) -> Result<Self, AlertError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(AlertError::EmptyCommand)?;

        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl AlertSink for CommandSink {
    fn name(&self) -> &str {
        "command"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("TRAFFIC_BYTES_USED", event.bytes_used.to_string())
            .env("TRAFFIC_LIMIT_BYTES", event.ceiling.to_string())
            .env("TRAFFIC_MONTH", &event.month)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);

        let status = tokio::time::timeout(self.timeout, command.status())
            .await
            .map_err(|_| AlertError::Timeout(self.timeout.as_secs()))??;

        info!(program = %self.program, %status, "alert command finished");
        if status.success() {
            Ok(())
        } else {
            Err(AlertError::CommandFailed(status))
        }
    }
}

/// POSTs the alert event as JSON.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http_client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AlertError> {
        let http_client = Client::builder()
            .user_agent("traffic-guard/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self { http_client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let response = self.http_client.post(&self.url).json(event).send().await?;
        let status = response.status();

        info!(url = %self.url, status = status.as_u16(), "alert webhook responded");
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::WebhookStatus(status.as_u16()))
        }
    }
}
