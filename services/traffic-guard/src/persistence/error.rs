use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("malformed traffic record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("traffic record has invalid month {0}")]
    InvalidMonth(u32),
}
