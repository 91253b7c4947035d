use serde::{Deserialize, Serialize};

use crate::tracker::{format_bytes, TrafficSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timestamp: i64,
    pub total_out_traffic: String,
    pub limit_traffic: String,
    pub used_percent: String,
    pub current_month: String,
}

impl From<&TrafficSnapshot> for StatusResponse {
    fn from(snapshot: &TrafficSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            total_out_traffic: format_bytes(snapshot.bytes_used),
            limit_traffic: format_bytes(snapshot.ceiling),
            used_percent: snapshot.used_percent_label(),
            current_month: snapshot.current_month.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}
