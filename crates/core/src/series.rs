use serde::{Deserialize, Serialize};

use crate::{CoreError, Timestamp};

/// A labelled marker attached to a point in time, e.g. a reported defect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub title: String,
    pub description: String,
}

/// One bucket of a minute or hour series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident: Option<Incident>,
}

impl SeriesPoint {
    pub fn new(timestamp: Timestamp, count: u64) -> Self {
        Self { timestamp, count, incident: None }
    }

    pub fn with_incident(mut self, incident: Incident) -> Self {
        self.incident = Some(incident);
        self
    }
}

/// Per-minute document as persisted by the counting devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MinuteDocument {
    pub ts_minute: Timestamp,
    pub count_last_minute: u64,
}

impl MinuteDocument {
    pub fn from_json_line(line: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_json_line(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<MinuteDocument> for SeriesPoint {
    fn from(doc: MinuteDocument) -> Self {
        SeriesPoint::new(doc.ts_minute, doc.count_last_minute)
    }
}
