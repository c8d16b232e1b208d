//! The fleet engine: per-machine order lifecycle, the tick-driven throughput
//! simulation, and stop recording.
//!
//! A [`Fleet`] is the single owner of all machine state. Callers serialize
//! access to it (see `pl-runtime`), so a tick and a control operation never
//! interleave.

use std::collections::HashMap;

use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pl_core::{Gpm, MachineId, MachineSnapshot, Timestamp, WorkOrderRecord, Worker};
use pl_predictors::ThroughputModel;

pub mod history;
pub mod machine;
pub mod stats;
pub mod stops;

pub use history::{HistoryWindow, DEFAULT_HISTORY_CAPACITY};
pub use machine::{Machine, OrderRequest};
pub use stats::RunningStats;
pub use stops::StopRecorder;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),
    #[error("cannot {op} machine {machine} while {state}")]
    InvalidTransition {
        machine: MachineId,
        op: &'static str,
        state: &'static str,
    },
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("simulation fault on {machine}: {detail}")]
    SimulationFault { machine: MachineId, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Speed a fresh order starts at.
    pub start_speed: Gpm,
    /// Reference line drawn on the live chart.
    pub target_speed: Gpm,
    pub history_capacity: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            start_speed: 340,
            target_speed: 350,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// RUT to operator name lookup.
#[derive(Debug, Clone, Default)]
pub struct OperatorDirectory {
    names: HashMap<String, String>,
}

impl OperatorDirectory {
    pub fn from_workers<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> Self {
        let names = workers
            .into_iter()
            .map(|w| (w.rut.clone(), w.name.clone()))
            .collect();
        Self { names }
    }

    /// Unknown RUTs are shown as-is.
    pub fn name_for(&self, rut: &str) -> String {
        self.names.get(rut).cloned().unwrap_or_else(|| rut.to_string())
    }
}

#[derive(Debug, Default)]
pub struct TickOutcome {
    pub advanced: usize,
    pub faults: Vec<FleetError>,
}

pub struct Fleet {
    cfg: FleetConfig,
    model: ThroughputModel,
    rng: SmallRng,
    operators: OperatorDirectory,
    recorder: StopRecorder,
    machines: Vec<Machine>,
    completed: Vec<WorkOrderRecord>,
}

impl Fleet {
    pub fn new(cfg: FleetConfig, model: ThroughputModel, seed: u64) -> Self {
        Self {
            cfg,
            model,
            rng: SmallRng::seed_from_u64(seed),
            operators: OperatorDirectory::default(),
            recorder: StopRecorder::default(),
            machines: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn with_operators(mut self, operators: OperatorDirectory) -> Self {
        self.operators = operators;
        self
    }

    pub fn add_machine(&mut self, machine: Machine) {
        self.machines.push(machine);
    }

    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id() == id)
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn snapshot(&self, id: &str) -> Result<MachineSnapshot, FleetError> {
        self.machine(id)
            .map(Machine::snapshot)
            .ok_or_else(|| FleetError::UnknownMachine(id.to_string()))
    }

    pub fn snapshots(&self) -> Vec<MachineSnapshot> {
        self.machines.iter().map(Machine::snapshot).collect()
    }

    /// Orders finished since the engine started, oldest first.
    pub fn completed_orders(&self) -> &[WorkOrderRecord] {
        &self.completed
    }

    fn machine_mut(&mut self, id: &str) -> Result<&mut Machine, FleetError> {
        self.machines
            .iter_mut()
            .find(|m| m.id() == id)
            .ok_or_else(|| FleetError::UnknownMachine(id.to_string()))
    }

    /// Starts a work order. Starting over an active order discards it along
    /// with the run's metrics, history and stops.
    pub fn start_order(
        &mut self,
        machine_id: &str,
        order_id: &str,
        operator_rut: &str,
        outputs_per_stroke: u32,
        target_units: Option<u64>,
        now: Timestamp,
    ) -> Result<MachineSnapshot, FleetError> {
        if outputs_per_stroke == 0 {
            return Err(FleetError::InvalidOrder(format!(
                "{order_id}: outputs per stroke must be at least 1"
            )));
        }
        let req = OrderRequest {
            order_id: order_id.to_string(),
            operator_name: self.operators.name_for(operator_rut),
            operator_rut: operator_rut.to_string(),
            outputs_per_stroke,
            target_units,
        };
        let start_speed = self.cfg.start_speed;
        let machine = self.machine_mut(machine_id)?;
        if let Some(previous) = machine.order() {
            warn!(machine = %machine_id, previous = %previous.id, "overwriting active order");
        }
        machine.start_order(req, start_speed, now);
        info!(machine = %machine_id, order = %order_id, outputs_per_stroke, "order started");
        Ok(machine.snapshot())
    }

    /// Stops the active order, if any. The final metrics stay readable until
    /// the next start.
    pub fn stop_order(
        &mut self,
        machine_id: &str,
        now: Timestamp,
    ) -> Result<MachineSnapshot, FleetError> {
        let idx = self
            .machines
            .iter()
            .position(|m| m.id() == machine_id)
            .ok_or_else(|| FleetError::UnknownMachine(machine_id.to_string()))?;
        let machine = &mut self.machines[idx];
        let Some(order) = machine.stop_order(&mut self.recorder, now) else {
            debug!(machine = %machine_id, "stop on idle machine");
            return Ok(machine.snapshot());
        };

        let record = WorkOrderRecord {
            id: order.id.clone(),
            worker_name: order.operator_name.clone(),
            rut: order.operator_rut.clone(),
            machine_name: machine.name().to_string(),
            start_time: order.start_time,
            end_time: now,
            units_produced: machine.metrics().total_units,
            target_units: order.target_units.unwrap_or(0),
            average_speed: machine.stats().mean() * f64::from(order.outputs_per_stroke),
            stops_count: u32::try_from(machine.stops().len()).unwrap_or(u32::MAX),
            quality: None,
        };
        info!(
            machine = %machine_id,
            order = %order.id,
            units = record.units_produced,
            stops = record.stops_count,
            "order completed"
        );
        let snapshot = machine.snapshot();
        self.completed.push(record);
        Ok(snapshot)
    }

    pub fn pause(
        &mut self,
        machine_id: &str,
        reason: &str,
        now: Timestamp,
    ) -> Result<MachineSnapshot, FleetError> {
        let machine = self.machine_mut(machine_id)?;
        machine.pause(reason.to_string(), now)?;
        info!(machine = %machine_id, reason, "order paused");
        Ok(machine.snapshot())
    }

    /// Resumes a paused order and records the stop. Resuming a running
    /// order does nothing.
    pub fn resume(
        &mut self,
        machine_id: &str,
        now: Timestamp,
    ) -> Result<MachineSnapshot, FleetError> {
        let idx = self
            .machines
            .iter()
            .position(|m| m.id() == machine_id)
            .ok_or_else(|| FleetError::UnknownMachine(machine_id.to_string()))?;
        let machine = &mut self.machines[idx];
        if let Some(stop) = machine.resume(&mut self.recorder, now)? {
            info!(
                machine = %machine_id,
                reason = %stop.reason,
                duration_secs = stop.duration_secs,
                "order resumed"
            );
        }
        Ok(machine.snapshot())
    }

    /// Advances every machine by one tick. Each machine is computed on a copy
    /// and swapped in only on success, so a fault leaves that machine at its
    /// previous state and the others still advance.
    pub fn tick(&mut self, now: Timestamp) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let target = self.cfg.target_speed;
        for slot in self.machines.iter_mut() {
            let mut next = slot.clone();
            match next.advance(&self.model, &mut self.rng, target, now) {
                Ok(()) => {
                    *slot = next;
                    outcome.advanced += 1;
                }
                Err(err) => {
                    warn!(machine = %slot.id(), error = %err, "tick skipped");
                    outcome.faults.push(err);
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use pl_core::{MachineStatus, Order, OrderStatus};
    use pl_predictors::{BandedRandomWalk, HoldSpeed};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn fleet() -> Fleet {
        let mut fleet = Fleet::new(FleetConfig::default(), ThroughputModel::default(), 11)
            .with_operators(OperatorDirectory::from_workers(&[Worker {
                name: "Juan Pérez".into(),
                rut: "12.345.678-9".into(),
            }]));
        fleet.add_machine(Machine::idle("m1", "Troqueladora A", DEFAULT_HISTORY_CAPACITY));
        fleet.add_machine(Machine::idle("m2", "Troqueladora B", DEFAULT_HISTORY_CAPACITY));
        fleet
    }

    #[test]
    fn start_then_one_tick() {
        let mut fleet = fleet();
        let snap = fleet
            .start_order("m1", "OT-1", "12.345.678-9", 4, Some(1000), t0())
            .unwrap();
        assert_eq!(snap.status, MachineStatus::Running);
        assert_eq!(snap.metrics.total_units, 0);
        assert!(snap.history.is_empty());
        assert_eq!(snap.order.as_ref().map(|o| o.operator_name.as_str()), Some("Juan Pérez"));

        fleet.tick(t0() + TimeDelta::seconds(1));
        assert_eq!(fleet.snapshot("m1").unwrap().history.len(), 1);
    }

    #[test]
    fn counters_follow_the_accumulator() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        for i in 1..=500 {
            fleet.tick(t0() + TimeDelta::seconds(i));
            let m = fleet.machine("m1").unwrap();
            let hits = m.metrics().total_hits;
            assert_eq!(hits, m.accumulator().internal().floor() as u64);
            assert_eq!(m.metrics().total_units, hits * 4);
            assert!(m.history().len() <= DEFAULT_HISTORY_CAPACITY);
        }
    }

    #[test]
    fn speed_stays_near_the_healthy_band() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-1", "x", 1, None, t0()).unwrap();
        let band = BandedRandomWalk::default().band;
        for i in 1..=2000 {
            fleet.tick(t0() + TimeDelta::seconds(i));
        }
        let m = fleet.machine("m1").unwrap();
        assert!(m.metrics().min_speed + 4 >= band.low);
        assert!(m.metrics().max_speed <= band.high + 4);
        let mean = m.stats().mean();
        assert!(mean > f64::from(band.low) - 4.0 && mean < f64::from(band.high) + 4.0);
    }

    #[test]
    fn constant_speed_accumulates_fractional_hits() {
        let mut fleet = Fleet::new(
            FleetConfig { start_speed: 90, ..FleetConfig::default() },
            ThroughputModel::new(Box::new(HoldSpeed), 60),
            1,
        );
        fleet.add_machine(Machine::idle("m1", "A", 30));
        fleet.start_order("m1", "OT-1", "x", 3, None, t0()).unwrap();
        fleet.tick(t0());
        // 1.5 strokes so far
        assert_eq!(fleet.machine("m1").unwrap().metrics().total_hits, 1);
        fleet.tick(t0());
        let m = fleet.machine("m1").unwrap();
        assert_eq!(m.metrics().total_hits, 3);
        assert_eq!(m.metrics().total_units, 9);
        assert_eq!(m.metrics().standard_deviation, 0.0);
        assert_eq!(m.metrics().min_speed, 90);
    }

    #[test]
    fn pause_resume_records_one_stop() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        let paused = fleet.pause("m1", "Colación", t0()).unwrap();
        assert_eq!(paused.status, MachineStatus::Idle);
        let order = paused.order.unwrap();
        assert!(matches!(order.status, OrderStatus::Paused { since, .. } if since == t0()));

        let resumed = fleet.resume("m1", t0() + TimeDelta::seconds(330)).unwrap();
        assert_eq!(resumed.status, MachineStatus::Running);
        assert_eq!(resumed.stops.len(), 1);
        let stop = &resumed.stops[0];
        assert_eq!(stop.reason, "Colación");
        assert_eq!(stop.duration_secs, (stop.end_time - stop.start_time).num_seconds());
        let row = stop.row();
        assert_eq!((row.start_time.as_str(), row.end_time.as_str()), ("10:00", "10:05"));
        assert_eq!(row.duration, "5m 30s");
        assert_eq!(resumed.order.unwrap().status, OrderStatus::Running);
    }

    #[test]
    fn paused_machine_does_not_produce() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        fleet.tick(t0());
        fleet.pause("m1", "Ajuste", t0()).unwrap();
        let before = fleet.machine("m1").unwrap().accumulator().internal();
        for _ in 0..5 {
            fleet.tick(t0());
        }
        let m = fleet.machine("m1").unwrap();
        assert_eq!(m.accumulator().internal(), before);
        // one running sample, one flatline
        assert_eq!(m.history().len(), 2);
        assert_eq!(m.history().last().map(|p| p.speed), Some(0));
    }

    #[test]
    fn idle_machine_never_flatlines_from_nothing() {
        let mut fleet = fleet();
        fleet.tick(t0());
        assert!(fleet.machine("m2").unwrap().history().is_empty());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut fleet = fleet();
        assert_eq!(
            fleet.pause("m1", "x", t0()).unwrap_err(),
            FleetError::InvalidTransition { machine: "m1".into(), op: "pause", state: "idle" }
        );
        assert!(matches!(
            fleet.resume("m1", t0()),
            Err(FleetError::InvalidTransition { op: "resume", .. })
        ));
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        fleet.pause("m1", "x", t0()).unwrap();
        assert!(matches!(
            fleet.pause("m1", "again", t0()),
            Err(FleetError::InvalidTransition { state: "paused", .. })
        ));
        assert!(matches!(
            fleet.start_order("m1", "OT-2", "x", 0, None, t0()),
            Err(FleetError::InvalidOrder(_))
        ));
    }

    #[test]
    fn unknown_machine() {
        let mut fleet = fleet();
        assert_eq!(
            fleet.stop_order("nope", t0()).unwrap_err(),
            FleetError::UnknownMachine("nope".into())
        );
        assert!(fleet.snapshot("nope").is_err());
    }

    #[test]
    fn stop_and_resume_are_idempotent() {
        let mut fleet = fleet();
        fleet.stop_order("m1", t0()).unwrap();
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        let before = fleet.resume("m1", t0()).unwrap();
        assert!(before.stops.is_empty());
        fleet.stop_order("m1", t0()).unwrap();
        fleet.stop_order("m1", t0()).unwrap();
        assert_eq!(fleet.completed_orders().len(), 1);
    }

    #[test]
    fn restart_while_running_discards_the_run() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();
        for _ in 0..120 {
            fleet.tick(t0());
        }
        let snap = fleet.start_order("m1", "OT-2", "x", 2, None, t0()).unwrap();
        assert_eq!(snap.metrics.total_hits, 0);
        assert!(snap.history.is_empty());
        assert_eq!(fleet.machine("m1").unwrap().accumulator().internal(), 0.0);
        assert_eq!(snap.order.unwrap().id, "OT-2");
    }

    #[test]
    fn stopping_a_paused_order_closes_the_pause() {
        let mut fleet = fleet();
        fleet.start_order("m1", "OT-9", "12.345.678-9", 4, Some(100), t0()).unwrap();
        fleet.pause("m1", "Falla", t0()).unwrap();
        let snap = fleet.stop_order("m1", t0() + TimeDelta::seconds(90)).unwrap();
        assert_eq!(snap.status, MachineStatus::Idle);
        assert!(snap.order.is_none());
        assert_eq!(snap.stops.len(), 1);

        let record = &fleet.completed_orders()[0];
        assert_eq!(record.id, "OT-9");
        assert_eq!(record.worker_name, "Juan Pérez");
        assert_eq!(record.stops_count, 1);
        assert_eq!(record.machine_name, "Troqueladora A");
    }

    #[test]
    fn fault_is_isolated_to_its_machine() {
        let mut fleet = fleet();
        let order = Order {
            id: "OT-X".into(),
            operator_name: "n".into(),
            operator_rut: "r".into(),
            outputs_per_stroke: 10,
            target_units: None,
            start_time: t0(),
            status: OrderStatus::Running,
        };
        fleet.add_machine(Machine::running("m3", "C", 30, order, u64::MAX / 4, 340));
        fleet.start_order("m1", "OT-1", "x", 4, None, t0()).unwrap();

        let outcome = fleet.tick(t0());
        assert_eq!(outcome.advanced, 2);
        assert_eq!(outcome.faults.len(), 1);
        assert!(matches!(&outcome.faults[0], FleetError::SimulationFault { machine, .. } if machine == "m3"));
        assert!(fleet.machine("m3").unwrap().history().is_empty());
        assert_eq!(fleet.machine("m1").unwrap().history().len(), 1);
    }
}
