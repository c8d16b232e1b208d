use chrono::{DurationRound, TimeDelta, TimeZone, Timelike, Utc};
use rand::Rng;

use pl_core::{Incident, MinuteDocument, SeriesPoint, Timestamp};

const MINUTES_PER_HOUR: i64 = 60;
const SIMULATED_HOURS: i64 = 4;
const STEADY: [u64; 8] = [7, 9, 8, 10, 11, 9, 8, 10];
const LOW: [u64; 6] = [3, 2, 3, 2, 3, 2];

pub fn simulated_start() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Four hours of counts with a slow second hour and a defect reported at
/// the start of it.
pub fn simulated_dashboard_series() -> Vec<SeriesPoint> {
    let start = simulated_start();
    (0..SIMULATED_HOURS * MINUTES_PER_HOUR)
        .map(|minute| {
            let idx = minute as usize;
            let count = if (MINUTES_PER_HOUR..2 * MINUTES_PER_HOUR).contains(&minute) {
                LOW[idx % LOW.len()]
            } else {
                STEADY[idx % STEADY.len()]
            };
            let point = SeriesPoint::new(start + TimeDelta::minutes(minute), count);
            if minute == MINUTES_PER_HOUR {
                point.with_incident(Incident {
                    title: "Pieza defectuosa".into(),
                    description: "Se registró un problema en el formulario de la máquina: \"Pieza defectuosa\"."
                        .into(),
                })
            } else {
                point
            }
        })
        .collect()
}

/// `minutes` per-minute documents ending just before `now`: busy between
/// 08:00 and 18:59, quiet otherwise, with occasional spikes.
pub fn random_minute_documents<R: Rng + ?Sized>(
    now: Timestamp,
    minutes: i64,
    rng: &mut R,
) -> Vec<MinuteDocument> {
    let end = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
    (0..minutes)
        .map(|i| {
            let ts_minute = end - TimeDelta::minutes(minutes - i);
            let mut count = if (8..=18).contains(&ts_minute.hour()) {
                rng.random_range(20..70)
            } else {
                rng.random_range(0..10)
            };
            if rng.random_bool(0.05) {
                count += rng.random_range(0..100);
            }
            MinuteDocument { ts_minute, count_last_minute: count }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn simulated_series_shape() {
        let series = simulated_dashboard_series();
        assert_eq!(series.len(), 240);
        assert_eq!(series[0].count, 7);
        assert_eq!(series[60].count, 3);
        assert!(series[60].incident.is_some());
        assert_eq!(series.iter().filter(|p| p.incident.is_some()).count(), 1);
        let second_hour: u64 = series[60..120].iter().map(|p| p.count).sum();
        assert_eq!(second_hour, 150);
    }

    #[test]
    fn random_documents_are_minute_aligned_and_ascending() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 45).unwrap();
        let docs = random_minute_documents(now, 24 * 60, &mut SmallRng::seed_from_u64(1));
        assert_eq!(docs.len(), 1440);
        for pair in docs.windows(2) {
            assert_eq!(pair[1].ts_minute - pair[0].ts_minute, TimeDelta::minutes(1));
        }
        assert!(docs.iter().all(|d| d.ts_minute.second() == 0 && d.count_last_minute < 170));
        assert!(docs.last().unwrap().ts_minute < now);
    }
}
