use pl_core::{Stop, Timestamp};

/// Turns a closed pause into a `Stop`, handing out fleet-unique ids.
#[derive(Debug, Clone)]
pub struct StopRecorder {
    next_id: u64,
}

impl Default for StopRecorder {
    fn default() -> Self {
        Self { next_id: 1 }
    }
}

impl StopRecorder {
    pub fn record(&mut self, since: Timestamp, reason: String, now: Timestamp) -> Stop {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        // A clock that stepped backwards yields a zero-length stop.
        let end_time = now.max(since);
        Stop {
            id,
            start_time: since,
            end_time,
            duration_secs: (end_time - since).num_seconds(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn duration_is_end_minus_start() {
        let mut recorder = StopRecorder::default();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 10, 5, 30).unwrap();
        let stop = recorder.record(start, "Colación".into(), end);
        assert_eq!(stop.duration_secs, 330);
        assert_eq!(stop.reason, "Colación");
        let next = recorder.record(start, "Ajuste".into(), end);
        assert_eq!(next.id, stop.id + 1);
    }

    #[test]
    fn backwards_clock_clamps_to_zero() {
        let mut recorder = StopRecorder::default();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 1, 9, 59, 0).unwrap();
        let stop = recorder.record(start, "x".into(), earlier);
        assert_eq!(stop.duration_secs, 0);
        assert_eq!(stop.end_time, start);
    }
}
