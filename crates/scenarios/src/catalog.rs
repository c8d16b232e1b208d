use chrono::TimeDelta;
use rand::Rng;

use pl_core::{Timestamp, WorkOrderRecord};

use crate::workers;

pub const MACHINE_NAMES: [&str; 5] = [
    "Troqueladora A",
    "Troqueladora B",
    "Troqueladora C",
    "Troqueladora D",
    "Troqueladora E",
];

const HIGH_PERFORMER: &str = "Juan Pérez";

/// Historical orders spread over the last 60 days, newest first.
pub fn generate_work_orders<R: Rng + ?Sized>(
    count: usize,
    now: Timestamp,
    rng: &mut R,
) -> Vec<WorkOrderRecord> {
    let workers = workers();
    let mut records: Vec<WorkOrderRecord> = (0..count)
        .map(|i| {
            let days_back = rng.random_range(0..60);
            let duration_minutes: u64 = 120 + rng.random_range(0..420);
            let start_time = now
                - TimeDelta::days(days_back)
                - TimeDelta::seconds(rng.random_range(0..8 * 3600));
            let end_time = start_time + TimeDelta::minutes(duration_minutes as i64);

            let worker = &workers[rng.random_range(0..workers.len())];
            let modifier = if worker.name == HIGH_PERFORMER { 1.2 } else { 1.0 };
            let average_speed = (f64::from(40 + rng.random_range(0..50_u32)) * modifier).floor();
            let units_produced = (average_speed * duration_minutes as f64 * 0.85).floor() as u64;

            WorkOrderRecord {
                id: format!("OT-{}", 25_000 + i),
                worker_name: worker.name.clone(),
                rut: worker.rut.clone(),
                machine_name: MACHINE_NAMES[rng.random_range(0..MACHINE_NAMES.len())].to_string(),
                start_time,
                end_time,
                units_produced,
                target_units: units_produced.div_ceil(500) * 500,
                average_speed,
                stops_count: rng.random_range(0..12),
                quality: Some(90 + rng.random_range(0..10_u8)),
            }
        })
        .collect();
    records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn catalogue_is_newest_first_and_in_range() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);
        let records = generate_work_orders(300, now, &mut rng);
        assert_eq!(records.len(), 300);
        for pair in records.windows(2) {
            assert!(pair[0].start_time >= pair[1].start_time);
        }
        for r in &records {
            assert!(r.start_time <= now);
            assert!(r.start_time > now - TimeDelta::days(61));
            assert!(r.target_units >= r.units_produced);
            assert_eq!(r.target_units % 500, 0);
            assert!((90..100).contains(&r.quality.unwrap_or(0)));
        }
    }

    #[test]
    fn same_seed_same_catalogue() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let a = generate_work_orders(20, now, &mut SmallRng::seed_from_u64(9));
        let b = generate_work_orders(20, now, &mut SmallRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
