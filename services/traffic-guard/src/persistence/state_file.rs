use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::PersistenceError;

/// On-disk snapshot of the traffic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "traffic")]
    pub bytes_used: u64,
    #[serde(rename = "month")]
    pub reset_month: u32,
}

impl PersistedRecord {
    pub fn new(bytes_used: u64, reset_month: u32) -> Self {
        Self {
            bytes_used,
            reset_month,
        }
    }
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Durable single-record file. Writes go to a sibling temp file that is
/// renamed over the target, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` for a missing, empty, or unreadable file.
    pub fn load(&self) -> Option<PersistedRecord> {
        match self.read_record() {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable traffic state file"
                );
                None
            }
        }
    }

    pub fn read_record(&self) -> Result<Option<PersistedRecord>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no traffic state file yet");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        let record: PersistedRecord = serde_json::from_str(&raw)?;
        if !(1..=12).contains(&record.reset_month) {
            return Err(PersistenceError::InvalidMonth(record.reset_month));
        }

        Ok(Some(record))
    }

    pub fn save(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec(record)?;
        let temp_path = self.temp_path();

        let written = write_synced(&temp_path, &payload).and_then(|()| {
            fs::rename(&temp_path, &self.path)?;
            Ok(())
        });

        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written?;

        debug!(
            path = %self.path.display(),
            bytes_used = record.bytes_used,
            month = record.reset_month,
            "saved traffic state"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from(super::DEFAULT_STATE_FILENAME));
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{}.tmp", std::process::id(), sequence));
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, payload: &[u8]) -> Result<(), PersistenceError> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_a_record() {
        let dir = tempdir().unwrap();
        let file = StateFile::new(dir.path().join("traffic.json"));

        file.save(&PersistedRecord::new(537_483_000_000, 5)).unwrap();

        assert_eq!(file.load(), Some(PersistedRecord::new(537_483_000_000, 5)));
    }

    #[test]
    fn writes_the_documented_layout() {
        let dir = tempdir().unwrap();
        let file = StateFile::new(dir.path().join("traffic.json"));
        file.save(&PersistedRecord::new(42, 11)).unwrap();

        let raw = fs::read_to_string(file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({ "traffic": 42, "month": 11 }));
    }

    #[test]
    fn missing_and_empty_files_load_as_absent() {
        let dir = tempdir().unwrap();
        let file = StateFile::new(dir.path().join("traffic.json"));
        assert_eq!(file.load(), None);

        fs::write(file.path(), "  \n").unwrap();
        assert_eq!(file.load(), None);
    }

    #[test]
    fn malformed_content_loads_as_absent() {
        let dir = tempdir().unwrap();
        let file = StateFile::new(dir.path().join("traffic.json"));

        fs::write(file.path(), "{\"traffic\": \"lots\"").unwrap();
        assert!(matches!(
            file.read_record(),
            Err(PersistenceError::Malformed(_))
        ));
        assert_eq!(file.load(), None);

        fs::write(file.path(), "{\"traffic\": 10, \"month\": 13}").unwrap();
        assert!(matches!(
            file.read_record(),
            Err(PersistenceError::InvalidMonth(13))
        ));
        assert_eq!(file.load(), None);
    }

    #[test]
    fn save_overwrites_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let file = StateFile::new(dir.path().join("nested").join("traffic.json"));

        file.save(&PersistedRecord::new(1, 1)).unwrap();
        file.save(&PersistedRecord::new(2, 2)).unwrap();

        assert_eq!(file.load(), Some(PersistedRecord::new(2, 2)));
        let entries: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![OsString::from("traffic.json")]);
    }
}
