//! The shared fleet owner and its ticker.
//!
//! Every mutation, tick or control operation, goes through one mutex so only
//! one mutator is ever active. Nothing awaits while the lock is held.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use pl_core::{MachineSnapshot, MachineStatus, Timestamp, WorkOrderRecord};
use pl_fleet::{Fleet, FleetError, TickOutcome};

use crate::clock::Clock;
use crate::metrics::MetricsRegistry;

#[derive(Clone)]
pub struct FleetHandle {
    fleet: Arc<Mutex<Fleet>>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRegistry,
}

impl FleetHandle {
    pub fn new(fleet: Fleet, clock: Arc<dyn Clock>, metrics: MetricsRegistry) -> Self {
        Self { fleet: Arc::new(Mutex::new(fleet)), clock, metrics }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    fn control<F>(&self, op: &'static str, f: F) -> Result<MachineSnapshot, FleetError>
    where
        F: FnOnce(&mut Fleet, Timestamp) -> Result<MachineSnapshot, FleetError>,
    {
        let now = self.clock.now();
        let result = {
            let mut fleet = self.fleet.lock();
            f(&mut *fleet, now)
        };
        match &result {
            Ok(_) => self.metrics.inc_control_ops(1),
            Err(err) => {
                self.metrics.inc_rejected_ops(1);
                debug!(op, error = %err, "control operation rejected");
            }
        }
        result
    }

    pub fn start_order(
        &self,
        machine_id: &str,
        order_id: &str,
        operator_rut: &str,
        outputs_per_stroke: u32,
        target_units: Option<u64>,
    ) -> Result<MachineSnapshot, FleetError> {
        self.control("start", |fleet, now| {
            fleet.start_order(
                machine_id,
                order_id,
                operator_rut,
                outputs_per_stroke,
                target_units,
                now,
            )
        })
    }

    pub fn stop_order(&self, machine_id: &str) -> Result<MachineSnapshot, FleetError> {
        self.control("stop", |fleet, now| fleet.stop_order(machine_id, now))
    }

    pub fn pause(&self, machine_id: &str, reason: &str) -> Result<MachineSnapshot, FleetError> {
        self.control("pause", |fleet, now| fleet.pause(machine_id, reason, now))
    }

    pub fn resume(&self, machine_id: &str) -> Result<MachineSnapshot, FleetError> {
        self.control("resume", |fleet, now| fleet.resume(machine_id, now))
    }

    /// Applies one tick under the lock.
    pub fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let (outcome, running) = {
            let mut fleet = self.fleet.lock();
            let outcome = fleet.tick(now);
            let running = fleet
                .machines()
                .iter()
                .filter(|m| m.status() == MachineStatus::Running)
                .count();
            (outcome, running)
        };
        self.metrics.inc_ticks(1);
        self.metrics.inc_machine_faults(outcome.faults.len() as u64);
        self.metrics.record_running_peak(running as u64);
        outcome
    }

    pub fn snapshot(&self, machine_id: &str) -> Result<MachineSnapshot, FleetError> {
        self.fleet.lock().snapshot(machine_id)
    }

    pub fn snapshots(&self) -> Vec<MachineSnapshot> {
        self.fleet.lock().snapshots()
    }

    pub fn completed_orders(&self) -> Vec<WorkOrderRecord> {
        self.fleet.lock().completed_orders().to_vec()
    }
}

/// Resolves once `rx` reads true or its sender is gone.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Ticks `handle` every `interval` until `shutdown` flips to true or its
/// sender is dropped. A tick is applied whole or not at all.
pub async fn run_ticker(
    handle: FleetHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = interval.as_millis() as u64, "ticker started");
    loop {
        tokio::select! {
            () = shutdown_requested(&mut shutdown) => {
                info!("shutdown received, stopping ticker");
                break;
            }
            _ = ticker.tick() => {
                let outcome = handle.tick();
                if !outcome.faults.is_empty() {
                    warn!(faults = outcome.faults.len(), "tick completed with faults");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use pl_fleet::{FleetConfig, Machine};
    use pl_predictors::ThroughputModel;

    fn handle() -> (FleetHandle, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        let mut fleet = Fleet::new(FleetConfig::default(), ThroughputModel::default(), 1);
        fleet.add_machine(Machine::idle("m1", "Troqueladora A", 30));
        let handle = FleetHandle::new(fleet, Arc::new(clock.clone()), MetricsRegistry::default());
        (handle, clock)
    }

    #[test]
    fn control_operations_use_the_injected_clock() {
        let (handle, clock) = handle();
        handle.start_order("m1", "OT-1", "12.345.678-9", 4, Some(1000)).unwrap();
        handle.pause("m1", "Colación").unwrap();
        clock.advance(TimeDelta::seconds(330));
        let snap = handle.resume("m1").unwrap();
        assert_eq!(snap.stops[0].duration_secs, 330);
        assert_eq!(snap.stops[0].row().duration, "5m 30s");

        assert!(handle.pause("nope", "x").is_err());
        let counters = handle.metrics().snapshot();
        assert_eq!(counters.control_ops, 3);
        assert_eq!(counters.rejected_ops, 1);
    }

    #[test]
    fn ticks_are_counted() {
        let (handle, clock) = handle();
        handle.start_order("m1", "OT-1", "x", 4, None).unwrap();
        for _ in 0..3 {
            clock.advance(TimeDelta::seconds(1));
            handle.tick();
        }
        assert_eq!(handle.snapshot("m1").unwrap().history.len(), 3);
        assert_eq!(handle.metrics().snapshot().ticks, 3);
        assert_eq!(handle.metrics().snapshot().running_peak, 1);
    }

    #[tokio::test]
    async fn ticker_stops_on_shutdown() {
        let (handle, _clock) = handle();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_ticker(handle.clone(), Duration::from_millis(5), rx));
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
        let ticks = handle.metrics().snapshot().ticks;
        assert!(ticks >= 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.metrics().snapshot().ticks, ticks);
    }
}
