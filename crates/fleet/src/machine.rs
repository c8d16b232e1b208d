use rand::RngCore;

use pl_core::{
    Gpm, HistoryPoint, MachineId, MachineSnapshot, MachineStatus, Metrics, Order, OrderStatus,
    Stop, Timestamp,
};
use pl_predictors::{HitAccumulator, ThroughputModel};

use crate::history::HistoryWindow;
use crate::stats::RunningStats;
use crate::stops::StopRecorder;
use crate::FleetError;

/// One press and everything the engine tracks about its current run.
#[derive(Debug, Clone)]
pub struct Machine {
    id: MachineId,
    name: String,
    status: MachineStatus,
    order: Option<Order>,
    metrics: Metrics,
    history: HistoryWindow,
    stops: Vec<Stop>,
    stats: RunningStats,
    accumulator: HitAccumulator,
}

/// Parameters of a fresh order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub order_id: String,
    pub operator_name: String,
    pub operator_rut: String,
    pub outputs_per_stroke: u32,
    pub target_units: Option<u64>,
}

impl Machine {
    pub fn idle(id: impl Into<MachineId>, name: impl Into<String>, history_capacity: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: MachineStatus::Idle,
            order: None,
            metrics: Metrics::default(),
            history: HistoryWindow::with_capacity(history_capacity),
            stops: Vec::new(),
            stats: RunningStats::default(),
            accumulator: HitAccumulator::default(),
        }
    }

    /// A machine that was already mid-run when the engine came up.
    pub fn running(
        id: impl Into<MachineId>,
        name: impl Into<String>,
        history_capacity: usize,
        order: Order,
        total_hits: u64,
        current_speed: Gpm,
    ) -> Self {
        let mut machine = Self::idle(id, name, history_capacity);
        machine.status = MachineStatus::Running;
        machine.accumulator = HitAccumulator::starting_at(total_hits);
        machine.metrics = Metrics {
            total_hits,
            total_units: total_hits.saturating_mul(u64::from(order.outputs_per_stroke)),
            current_speed,
            outputs_per_stroke: order.outputs_per_stroke,
            ..Metrics::default()
        };
        machine.order = Some(order);
        machine
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn accumulator(&self) -> &HitAccumulator {
        &self.accumulator
    }

    pub fn state_name(&self) -> &'static str {
        self.order.as_ref().map_or("idle", |o| o.status.name())
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            order: self.order.clone(),
            metrics: self.metrics.clone(),
            history: self.history.to_vec(),
            stops: self.stops.clone(),
            progress: self
                .order
                .as_ref()
                .and_then(|o| self.metrics.progress(o.target_units)),
        }
    }

    fn invalid(&self, op: &'static str) -> FleetError {
        FleetError::InvalidTransition {
            machine: self.id.clone(),
            op,
            state: self.state_name(),
        }
    }

    /// Begins a run. Any active order is overwritten and the run state is
    /// zeroed.
    pub(crate) fn start_order(&mut self, req: OrderRequest, start_speed: Gpm, now: Timestamp) {
        self.order = Some(Order {
            id: req.order_id,
            operator_name: req.operator_name,
            operator_rut: req.operator_rut,
            outputs_per_stroke: req.outputs_per_stroke,
            target_units: req.target_units,
            start_time: now,
            status: OrderStatus::Running,
        });
        self.status = MachineStatus::Running;
        self.metrics = Metrics {
            current_speed: start_speed,
            outputs_per_stroke: req.outputs_per_stroke,
            ..Metrics::default()
        };
        self.history.clear();
        self.stops.clear();
        self.stats.reset();
        self.accumulator = HitAccumulator::default();
    }

    /// Ends the run and hands back the finished order. A pending pause is
    /// closed as a stop first.
    pub(crate) fn stop_order(
        &mut self,
        recorder: &mut StopRecorder,
        now: Timestamp,
    ) -> Option<Order> {
        let mut order = self.order.take()?;
        let previous = std::mem::replace(&mut order.status, OrderStatus::Completed);
        if let OrderStatus::Paused { since, reason } = previous {
            self.stops.push(recorder.record(since, reason, now));
        }
        self.status = MachineStatus::Idle;
        Some(order)
    }

    pub(crate) fn pause(&mut self, reason: String, now: Timestamp) -> Result<(), FleetError> {
        if !matches!(self.order.as_ref().map(|o| &o.status), Some(OrderStatus::Running)) {
            return Err(self.invalid("pause"));
        }
        if let Some(order) = self.order.as_mut() {
            order.status = OrderStatus::Paused { since: now, reason };
        }
        self.status = MachineStatus::Idle;
        Ok(())
    }

    /// Returns the recorded stop, or `None` when the order was already running.
    pub(crate) fn resume(
        &mut self,
        recorder: &mut StopRecorder,
        now: Timestamp,
    ) -> Result<Option<Stop>, FleetError> {
        match self.order.as_ref().map(|o| &o.status) {
            Some(OrderStatus::Paused { .. }) => {}
            Some(OrderStatus::Running) => return Ok(None),
            _ => return Err(self.invalid("resume")),
        }
        let Some(order) = self.order.as_mut() else {
            return Ok(None);
        };
        let previous = std::mem::replace(&mut order.status, OrderStatus::Running);
        let OrderStatus::Paused { since, reason } = previous else {
            return Ok(None);
        };
        let stop = recorder.record(since, reason, now);
        self.stops.push(stop.clone());
        self.status = MachineStatus::Running;
        Ok(Some(stop))
    }

    /// Advances one tick. Idle machines only flatline their chart once.
    pub(crate) fn advance(
        &mut self,
        model: &ThroughputModel,
        rng: &mut dyn RngCore,
        target: Gpm,
        now: Timestamp,
    ) -> Result<(), FleetError> {
        let outputs = match (&self.order, self.status) {
            (Some(order), MachineStatus::Running) => u64::from(order.outputs_per_stroke),
            _ => {
                if self.history.last().is_some_and(|p| p.speed > 0) {
                    self.history.push(HistoryPoint { time: now, speed: 0, target });
                }
                return Ok(());
            }
        };

        let sample = model.sample(self.metrics.current_speed, rng);
        self.accumulator.add(sample.hits);
        if !self.accumulator.is_finite() {
            return Err(FleetError::SimulationFault {
                machine: self.id.clone(),
                detail: format!("hit accumulator diverged at speed {}", sample.speed),
            });
        }

        let total_hits = self.accumulator.total_hits();
        let Some(total_units) = total_hits.checked_mul(outputs) else {
            return Err(FleetError::SimulationFault {
                machine: self.id.clone(),
                detail: format!("unit counter overflow at {total_hits} hits"),
            });
        };
        self.stats.push(f64::from(sample.speed));
        self.metrics.total_hits = total_hits;
        self.metrics.total_units = total_units;
        self.metrics.current_speed = sample.speed;
        self.metrics.min_speed = self.stats.min().map_or(0, |v| v as Gpm);
        self.metrics.max_speed = self.stats.max().map_or(0, |v| v as Gpm);
        self.metrics.standard_deviation = self.stats.population_std_dev();
        self.history.push(HistoryPoint { time: now, speed: sample.speed, target });
        Ok(())
    }
}
