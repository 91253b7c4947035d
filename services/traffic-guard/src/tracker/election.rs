use tracing::{info, warn};

use crate::store::{AddOutcome, SharedStore, TIMER_OWNER_KEY};

/// Result of trying to become the worker that runs the save timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Election {
    Owner,
    Follower,
}

/// Claims timer ownership with a single add-if-absent. The claim has no
/// expiry; it lasts until the process group exits or [`release_timer_owner`]
/// is called.
pub fn elect_timer_owner(store: &dyn SharedStore, worker_id: usize) -> Election {
    match store.add_if_absent(TIMER_OWNER_KEY, worker_id as u64, None) {
        Ok(AddOutcome::Added) => {
            info!(worker_id, "elected save timer owner");
            Election::Owner
        }
        Ok(AddOutcome::AlreadyExists) => {
            info!(worker_id, "save timer already owned by another worker");
            Election::Follower
        }
        Err(err) => {
            warn!(worker_id, error = %err, "save timer election failed");
            Election::Follower
        }
    }
}

pub fn release_timer_owner(store: &dyn SharedStore, worker_id: usize) {
    match store.delete(TIMER_OWNER_KEY) {
        Ok(()) => info!(worker_id, "released save timer ownership"),
        Err(err) => warn!(worker_id, error = %err, "failed to release save timer ownership"),
    }
}
