use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::error::StoreError;
use super::{AddOutcome, SharedStore};

struct Slot {
    value: AtomicU64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: u64, ttl: Option<Duration>) -> Self {
        Self {
            value: AtomicU64::new(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }

    fn load(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    fn add(&self, delta: u64) -> u64 {
        let previous = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(delta))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_add(delta)
    }

    fn sub(&self, delta: u64) -> u64 {
        let previous = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(delta))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_sub(delta)
    }
}

/// In-process [`SharedStore`] backed by sharded maps of atomic cells.
///
/// Workers hold clones of one `Arc<MemoryStore>`; increments on an existing
/// key only take a shard read guard and never contend with each other.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|slot| slot.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        check_key(key)?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.load()))
    }

    fn set(&self, key: &str, value: u64) -> Result<(), StoreError> {
        check_key(key)?;
        self.entries.insert(key.to_string(), Slot::new(value, None));
        Ok(())
    }

    fn incr(&self, key: &str, delta: u64) -> Result<u64, StoreError> {
        check_key(key)?;
        let now = Instant::now();

        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return Ok(slot.add(delta));
            }
        }

        let slot = self
            .entries
            .entry(key.to_string())
            .and_modify(|slot| {
                if !slot.is_live(now) {
                    *slot = Slot::new(0, None);
                }
            })
            .or_insert_with(|| Slot::new(0, None));
        Ok(slot.add(delta))
    }

    fn decr(&self, key: &str, delta: u64) -> Result<u64, StoreError> {
        check_key(key)?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map_or(0, |slot| slot.sub(delta)))
    }

    fn add_if_absent(
        &self,
        key: &str,
        value: u64,
        ttl: Option<Duration>,
    ) -> Result<AddOutcome, StoreError> {
        check_key(key)?;
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(AddOutcome::AlreadyExists);
                }
                occupied.insert(Slot::new(value, ttl));
                Ok(AddOutcome::Added)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(AddOutcome::Added)
            }
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        new: u64,
    ) -> Result<bool, StoreError> {
        check_key(key)?;
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let live = occupied.get().is_live(now);
                let current = if live { Some(occupied.get().load()) } else { None };
                if current != expected {
                    return Ok(false);
                }
                if live {
                    occupied.get().value.store(new, Ordering::SeqCst);
                } else {
                    occupied.insert(Slot::new(new, None));
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(Slot::new(new, None));
                Ok(true)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}
