pub mod alert;
pub mod api;
pub mod config;
pub mod persistence;
pub mod store;
pub mod tracker;

pub use alert::{AlertDispatcher, AlertError, AlertEvent, AlertSink, CommandSink, WebhookSink};
pub use api::{create_router, ApiState, StatusResponse};
pub use config::TrafficGuardConfig;
pub use persistence::{PersistedRecord, PersistenceError, StateFile};
pub use store::{AddOutcome, MemoryStore, SharedStore, StoreError};
pub use tracker::{
    Clock, LimitDecision, ManualClock, SaveTimer, StateOrigin, SystemClock, TrafficEngine,
    TrafficPhase, TrafficSnapshot,
};
