pub mod error;
pub mod state_file;

pub use error::PersistenceError;
pub use state_file::{PersistedRecord, StateFile};

pub const DEFAULT_STATE_FILENAME: &str = "traffic.json";
