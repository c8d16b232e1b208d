use serde::{Deserialize, Serialize};

use crate::{Gpm, MachineId, OrderId, Timestamp};

/// Whether the press is physically producing. A paused order leaves the
/// machine `Idle`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Idle,
    Running,
}

/// Lifecycle of a work order. The pause bookkeeping lives inside the
/// `Paused` variant so a paused order cannot lack its start time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Running,
    Paused { since: Timestamp, reason: String },
    Completed,
}

impl OrderStatus {
    pub fn name(&self) -> &'static str {
        match self {
            OrderStatus::Running => "running",
            OrderStatus::Paused { .. } => "paused",
            OrderStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub operator_name: String,
    pub operator_rut: String,
    pub outputs_per_stroke: u32,
    pub target_units: Option<u64>,
    pub start_time: Timestamp,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_hits: u64,
    pub total_units: u64,
    pub current_speed: Gpm,
    pub min_speed: Gpm,
    pub max_speed: Gpm,
    pub standard_deviation: f64,
    pub outputs_per_stroke: u32,
}

impl Metrics {
    /// Completion against the order target, clamped to 100.
    pub fn progress(&self, target_units: Option<u64>) -> Option<f64> {
        match target_units {
            Some(target) if target > 0 => {
                Some((self.total_units as f64 / target as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryPoint {
    pub time: Timestamp,
    pub speed: Gpm,
    pub target: Gpm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: u64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub duration_secs: i64,
    pub reason: String,
}

/// A stop rendered the way operators read it on the stops table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StopRow {
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub reason: String,
}

impl Stop {
    pub fn row(&self) -> StopRow {
        StopRow {
            start_time: self.start_time.format("%H:%M").to_string(),
            end_time: self.end_time.format("%H:%M").to_string(),
            duration: format_duration(self.duration_secs),
            reason: self.reason.clone(),
        }
    }
}

/// `45s`, `5m 30s`, `1h 2m`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Read-only view of one machine, returned by every control operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    pub id: MachineId,
    pub name: String,
    pub status: MachineStatus,
    pub order: Option<Order>,
    pub metrics: Metrics,
    pub history: Vec<HistoryPoint>,
    pub stops: Vec<Stop>,
    pub progress: Option<f64>,
}
