use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("no async runtime available to drive the save timer")]
    NoRuntime,
}
