//! Core types for Pressline: machines, work orders, and the minute/hour series
//! that feed the dashboards.

use chrono::{DateTime, Utc};

pub type MachineId = String;
pub type OrderId = String;
pub type Timestamp = DateTime<Utc>;

/// Press strokes per minute.
pub type Gpm = u32;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub mod machine;
pub mod series;
pub mod work_order;

pub use machine::{
    HistoryPoint, MachineSnapshot, MachineStatus, Metrics, Order, OrderStatus, Stop, StopRow,
};
pub use series::{Incident, MinuteDocument, SeriesPoint};
pub use work_order::{WorkOrderRecord, Worker};
