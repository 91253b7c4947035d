use std::time::Duration;

pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

pub const TRAFFIC_BYTES_KEY: &str = "traffic:bytes_used";
pub const TRAFFIC_MONTH_KEY: &str = "traffic:reset_month";
pub const TRAFFIC_ALERTED_KEY: &str = "traffic:alerted";
pub const TIMER_OWNER_KEY: &str = "traffic:timer_owner";
pub const ROLLOVER_LOCK_KEY: &str = "traffic:rollover_lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyExists,
}

/// Key/value store shared by every worker on the host.
///
/// Every operation is atomic with respect to concurrent callers and returns
/// without waiting on work done elsewhere.
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    fn set(&self, key: &str, value: u64) -> Result<(), StoreError>;

    /// Fetch-and-add. An absent key starts at zero; the result saturates at `u64::MAX`.
    fn incr(&self, key: &str, delta: u64) -> Result<u64, StoreError>;

    /// Fetch-and-subtract, saturating at zero. An absent key is left absent.
    fn decr(&self, key: &str, delta: u64) -> Result<u64, StoreError>;

    fn add_if_absent(
        &self,
        key: &str,
        value: u64,
        ttl: Option<Duration>,
    ) -> Result<AddOutcome, StoreError>;

    /// Replaces the value only when the current one equals `expected`
    /// (`None` meaning absent). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        new: u64,
    ) -> Result<bool, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
