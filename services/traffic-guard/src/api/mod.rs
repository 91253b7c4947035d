use std::sync::Arc;

pub mod gate;
pub mod handlers;
pub mod router;
pub mod types;

pub use gate::{traffic_gate, LIMIT_EXCEEDED_BODY};
pub use handlers::*;
pub use router::create_router;
pub use types::*;

use crate::config::TrafficGuardConfig;
use crate::tracker::TrafficEngine;

pub struct ApiState {
    pub engine: TrafficEngine,
    pub config: Arc<TrafficGuardConfig>,
}

impl ApiState {
    pub fn new(engine: TrafficEngine, config: Arc<TrafficGuardConfig>) -> Self {
        Self { engine, config }
    }
}
