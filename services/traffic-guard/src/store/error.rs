use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
}
