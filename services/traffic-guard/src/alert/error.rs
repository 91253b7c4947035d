use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert command is empty")]
    EmptyCommand,
    #[error("failed to launch alert command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("alert command exited with {0}")]
    CommandFailed(std::process::ExitStatus),
    #[error("alert webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("alert webhook responded with status {0}")]
    WebhookStatus(u16),
    #[error("alert timed out after {0} seconds")]
    Timeout(u64),
}
