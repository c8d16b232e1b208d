use serde::Serialize;

use pl_core::{SeriesPoint, Timestamp};

use crate::series::bucket_by_hour;

/// Time range the dashboard was asked about. Used for the reported range
/// when the series is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IncidentEvent {
    pub timestamp: Timestamp,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_count: u64,
    pub latest_count: Option<u64>,
    pub latest_timestamp: Option<Timestamp>,
    pub average_per_minute: f64,
    pub average_per_hour: f64,
    pub per_minute_series: Vec<SeriesPoint>,
    pub per_hour_series: Vec<SeriesPoint>,
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_label: Option<String>,
    pub events: Vec<IncidentEvent>,
}

fn mean(total: u64, len: usize) -> f64 {
    if len == 0 {
        0.0
    } else {
        total as f64 / len as f64
    }
}

/// Builds the dashboard payload from a per-minute series. An empty series
/// yields zeros and nulls, never an error.
pub fn aggregate(per_minute: Vec<SeriesPoint>, window: Window) -> DashboardSummary {
    let per_hour = bucket_by_hour(&per_minute);

    let total_count = per_minute.iter().fold(0_u64, |acc, p| acc.saturating_add(p.count));
    let hour_total = per_hour.iter().fold(0_u64, |acc, p| acc.saturating_add(p.count));
    let latest = per_minute.last();

    let events: Vec<IncidentEvent> = per_minute
        .iter()
        .filter_map(|p| {
            p.incident.as_ref().map(|i| IncidentEvent {
                timestamp: p.timestamp,
                title: i.title.clone(),
                description: i.description.clone(),
            })
        })
        .collect();

    DashboardSummary {
        total_count,
        latest_count: latest.map(|p| p.count),
        latest_timestamp: latest.map(|p| p.timestamp),
        average_per_minute: mean(total_count, per_minute.len()),
        average_per_hour: mean(hour_total, per_hour.len()),
        range_start: per_minute.first().map_or(window.start, |p| p.timestamp),
        range_end: latest.map_or(window.end, |p| p.timestamp),
        incident_timestamp: events.first().map(|e| e.timestamp),
        incident_label: events.first().map(|e| e.title.clone()),
        events,
        per_hour_series: per_hour,
        per_minute_series: per_minute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use pl_core::Incident;

    fn window() -> Window {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        Window { start, end: start + TimeDelta::hours(4) }
    }

    #[test]
    fn empty_series_degrades_to_zero() {
        let w = window();
        let summary = aggregate(Vec::new(), w);
        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.latest_count, None);
        assert_eq!(summary.latest_timestamp, None);
        assert_eq!(summary.average_per_minute, 0.0);
        assert_eq!(summary.average_per_hour, 0.0);
        assert_eq!(summary.range_start, w.start);
        assert_eq!(summary.range_end, w.end);
        assert!(summary.per_hour_series.is_empty());
    }

    #[test]
    fn averages_totals_and_range() {
        let t0 = window().start;
        let series = vec![
            SeriesPoint::new(t0, 5),
            SeriesPoint::new(t0 + TimeDelta::minutes(1), 7),
            SeriesPoint::new(t0 + TimeDelta::minutes(59), 3),
            SeriesPoint::new(t0 + TimeDelta::minutes(60), 9)
                .with_incident(Incident { title: "Pieza defectuosa".into(), description: "d".into() }),
        ];
        let summary = aggregate(series, window());
        assert_eq!(summary.total_count, 24);
        assert_eq!(summary.average_per_minute, 6.0);
        assert_eq!(summary.average_per_hour, 12.0);
        assert_eq!(summary.latest_count, Some(9));
        assert_eq!(summary.range_start, t0);
        assert_eq!(summary.range_end, t0 + TimeDelta::minutes(60));
        assert_eq!(summary.incident_label.as_deref(), Some("Pieza defectuosa"));
        assert_eq!(summary.incident_timestamp, Some(t0 + TimeDelta::hours(1)));
        assert_eq!(summary.events.len(), 1);
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let summary = aggregate(vec![SeriesPoint::new(window().start, 1)], window());
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("averagePerMinute").is_some());
        assert!(json.get("perHourSeries").is_some());
        assert!(json.get("incidentLabel").is_none());
    }
}
