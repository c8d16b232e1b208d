use serde::{Deserialize, Serialize};

use crate::{OrderId, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worker {
    pub name: String,
    pub rut: String,
}

/// A finished work order as shown in the history views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderRecord {
    pub id: OrderId,
    pub worker_name: String,
    pub rut: String,
    pub machine_name: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub units_produced: u64,
    pub target_units: u64,
    /// Units per minute.
    pub average_speed: f64,
    pub stops_count: u32,
    /// Percentage 0-100, when inspected.
    pub quality: Option<u8>,
}

impl WorkOrderRecord {
    /// Units produced against target as a percentage. A zero target counts as one.
    pub fn efficiency(&self) -> f64 {
        self.units_produced as f64 / self.target_units.max(1) as f64 * 100.0
    }

    /// Case-insensitive substring match on order id, operator or machine.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.id.to_lowercase().contains(needle)
            || self.worker_name.to_lowercase().contains(needle)
            || self.machine_name.to_lowercase().contains(needle)
    }
}
