pub mod clock;
pub mod election;
pub mod engine;
pub mod error;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use election::{elect_timer_owner, release_timer_owner, Election};
pub use engine::{SaveTimer, TrafficEngine};
pub use error::TimerError;
pub use status::{format_bytes, TrafficSnapshot};

/// Outcome of the gate check run before a response is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allow,
    Deny { used: u64, ceiling: u64 },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allow)
    }
}

/// Position within the current month epoch. `OverLimit` only goes back to
/// `Accumulating` through a month reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPhase {
    Accumulating,
    OverLimit,
}

/// Where a worker's view of the counter came from at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    SharedStore,
    Persisted,
    Fresh,
}
