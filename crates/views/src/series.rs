use std::collections::BTreeMap;

use chrono::{DurationRound, TimeDelta};

use pl_core::{SeriesPoint, Timestamp};

/// Start of the hour containing `ts`.
pub fn truncate_to_hour(ts: Timestamp) -> Timestamp {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}

/// Sums per-minute points into per-hour buckets, ascending by hour whatever
/// the input order. A bucket keeps the first incident seen for its hour.
pub fn bucket_by_hour(points: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<Timestamp, SeriesPoint> = BTreeMap::new();
    for point in points {
        let hour = truncate_to_hour(point.timestamp);
        let bucket = buckets
            .entry(hour)
            .or_insert_with(|| SeriesPoint::new(hour, 0));
        bucket.count = bucket.count.saturating_add(point.count);
        if bucket.incident.is_none() {
            bucket.incident = point.incident.clone();
        }
    }
    buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};
    use pl_core::Incident;
    use proptest::prelude::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn incident(title: &str) -> Incident {
        Incident { title: title.into(), description: String::new() }
    }

    #[test]
    fn sums_within_each_hour() {
        let points = vec![
            SeriesPoint::new(t0(), 5),
            SeriesPoint::new(t0() + TimeDelta::minutes(1), 7),
            SeriesPoint::new(t0() + TimeDelta::minutes(59), 3),
            SeriesPoint::new(t0() + TimeDelta::minutes(60), 9),
        ];
        let hours = bucket_by_hour(&points);
        assert_eq!(
            hours,
            vec![
                SeriesPoint::new(t0(), 15),
                SeriesPoint::new(t0() + TimeDelta::hours(1), 9),
            ]
        );
    }

    #[test]
    fn first_incident_in_an_hour_wins() {
        let points = vec![
            SeriesPoint::new(t0() + TimeDelta::minutes(60), 1),
            SeriesPoint::new(t0() + TimeDelta::minutes(61), 1).with_incident(incident("first")),
            SeriesPoint::new(t0() + TimeDelta::minutes(62), 1).with_incident(incident("second")),
        ];
        let hours = bucket_by_hour(&points);
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].incident.as_ref().map(|i| i.title.as_str()), Some("first"));
    }

    #[test]
    fn sub_second_timestamps_truncate_cleanly() {
        let ts = t0() + TimeDelta::milliseconds(2_345_678);
        let hour = truncate_to_hour(ts);
        assert_eq!(hour, t0());
        assert_eq!(hour.nanosecond(), 0);
    }

    proptest! {
        #[test]
        fn bucketing_preserves_sum_and_sorts(
            offsets in proptest::collection::vec((0_i64..10_000, 0_u64..500), 1..300)
        ) {
            let points: Vec<SeriesPoint> = offsets
                .iter()
                .map(|(m, c)| SeriesPoint::new(t0() + TimeDelta::minutes(*m), *c))
                .collect();
            let hours = bucket_by_hour(&points);
            let minute_total: u64 = points.iter().map(|p| p.count).sum();
            let hour_total: u64 = hours.iter().map(|p| p.count).sum();
            prop_assert_eq!(minute_total, hour_total);
            for pair in hours.windows(2) {
                prop_assert!(pair[0].timestamp < pair[1].timestamp);
            }
            for h in &hours {
                prop_assert_eq!(h.timestamp.minute(), 0);
                prop_assert_eq!(h.timestamp.second(), 0);
            }
        }
    }
}
