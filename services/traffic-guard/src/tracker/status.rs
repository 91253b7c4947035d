use serde::{Deserialize, Serialize};

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Point-in-time view of the traffic budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub timestamp: i64,
    pub bytes_used: u64,
    pub ceiling: u64,
    pub current_month: String,
}

impl TrafficSnapshot {
    pub fn used_percent(&self) -> f64 {
        (self.bytes_used as f64 / self.ceiling.max(1) as f64) * 100.0
    }

    pub fn used_percent_label(&self) -> String {
        format!("{:.2}%", self.used_percent())
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.ceiling.saturating_sub(self.bytes_used)
    }

    pub fn is_over_limit(&self) -> bool {
        self.bytes_used >= self.ceiling
    }
}

/// Formats a byte count with binary units and two decimals, e.g. `512.00 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
