use std::sync::Arc;

use tempfile::TempDir;
use traffic_guard::{
    AlertDispatcher, MemoryStore, SharedStore, StateFile, TrafficEngine, TrafficGuardConfig,
};

pub use traffic_guard;

/// A set of workers sharing one store and one state file in a temp dir.
pub struct TrafficBenchFixture {
    pub store: Arc<dyn SharedStore>,
    pub workers: Vec<TrafficEngine>,
    pub temp_dir: TempDir,
}

impl TrafficBenchFixture {
    pub fn new(workers: usize, limit_bytes: u64) -> Self {
        let temp_dir = TempDir::new().expect("tempdir");
        let config = TrafficGuardConfig {
            limit_bytes,
            state_file: temp_dir.path().join("traffic.json"),
            ..TrafficGuardConfig::default()
        };

        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let state_file = Arc::new(StateFile::new(config.state_file.clone()));
        let alerts = AlertDispatcher::new(Arc::clone(&store), Vec::new());

        let workers: Vec<_> = (0..workers.max(1))
            .map(|worker_id| {
                TrafficEngine::new(
                    worker_id,
                    Arc::clone(&store),
                    Arc::clone(&state_file),
                    alerts.clone(),
                    &config,
                )
            })
            .collect();
        workers[0].initialize_state();

        Self {
            store,
            workers,
            temp_dir,
        }
    }

    pub fn worker(&self, index: usize) -> &TrafficEngine {
        &self.workers[index % self.workers.len()]
    }
}
