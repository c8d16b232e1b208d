//! Seeded demo datasets: the starting roster, operators, pending orders, the
//! historical work-order catalogue and minute-count series.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use pl_core::{Order, OrderStatus, Timestamp, Worker};
use pl_fleet::{Fleet, FleetConfig, Machine, OperatorDirectory};
use pl_predictors::ThroughputModel;

pub mod catalog;
pub mod minutes;

pub use catalog::{generate_work_orders, MACHINE_NAMES};
pub use minutes::{random_minute_documents, simulated_dashboard_series, simulated_start};

pub fn workers() -> Vec<Worker> {
    [
        ("Juan Pérez", "12.345.678-9"),
        ("María González", "9.876.543-2"),
        ("Carlos Ruiz", "15.432.109-8"),
        ("Ana López", "18.765.432-1"),
        ("Pedro Sánchez", "10.987.654-3"),
    ]
    .into_iter()
    .map(|(name, rut)| Worker { name: name.into(), rut: rut.into() })
    .collect()
}

/// An order waiting to be picked up at a press.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: String,
    pub client: String,
    pub product: String,
    pub target: u64,
    pub outputs: u32,
}

pub fn pending_orders() -> Vec<PendingOrder> {
    [
        ("OT-3001", "Coca-Cola", "Caja 6pack 350ml", 50_000, 8),
        ("OT-3002", "Nestlé", "Estuche Cereales 500g", 25_000, 4),
        ("OT-3003", "Unilever", "Display Detergente 1kg", 12_000, 6),
        ("OT-3004", "CCU", "Bandeja Cerveza 470ml", 80_000, 10),
        ("OT-3005", "Carozzi", "Caja Fideos 400g", 35_000, 5),
    ]
    .into_iter()
    .map(|(id, client, product, target, outputs)| PendingOrder {
        id: id.into(),
        client: client.into(),
        product: product.into(),
        target,
        outputs,
    })
    .collect()
}

/// Troqueladora A starts idle for the operator; B..H are background presses,
/// two out of three already an hour into a run.
pub fn demo_roster(history_capacity: usize, now: Timestamp) -> Vec<Machine> {
    let directory = OperatorDirectory::from_workers(&workers());
    let mut roster = vec![Machine::idle("machine-1", "Troqueladora A", history_capacity)];

    for (i, letter) in ('B'..='H').enumerate() {
        let id = format!("machine-{}", i + 2);
        let name = format!("Troqueladora {letter}");
        if i % 3 == 0 {
            roster.push(Machine::idle(id, name, history_capacity));
            continue;
        }
        let i = i as u64;
        let rut = format!("1{i}.456.789-k");
        let order = Order {
            id: format!("OT-202{i}"),
            operator_name: directory.name_for(&rut),
            operator_rut: rut,
            outputs_per_stroke: 10,
            target_units: Some(50_000 + i * 1_000),
            start_time: now - TimeDelta::hours(1),
            status: OrderStatus::Running,
        };
        let hits = 1_500 + i * 500;
        let speed = 330 + 5 * i as u32;
        roster.push(Machine::running(id, name, history_capacity, order, hits, speed));
    }
    roster
}

/// A fleet with the demo roster and operator directory installed.
pub fn demo_fleet(cfg: FleetConfig, model: ThroughputModel, seed: u64, now: Timestamp) -> Fleet {
    let capacity = cfg.history_capacity;
    let mut fleet =
        Fleet::new(cfg, model, seed).with_operators(OperatorDirectory::from_workers(&workers()));
    for machine in demo_roster(capacity, now) {
        fleet.add_machine(machine);
    }
    fleet
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pl_core::MachineStatus;

    #[test]
    fn roster_matches_the_floor() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let roster = demo_roster(30, now);
        assert_eq!(roster.len(), 8);
        assert_eq!(roster[0].name(), "Troqueladora A");
        assert_eq!(roster[0].status(), MachineStatus::Idle);
        let running: Vec<&str> = roster
            .iter()
            .filter(|m| m.status() == MachineStatus::Running)
            .map(|m| m.id())
            .collect();
        assert_eq!(running, vec!["machine-3", "machine-4", "machine-6", "machine-7"]);

        let c = &roster[2];
        assert_eq!(c.order().map(|o| o.id.as_str()), Some("OT-2021"));
        assert_eq!(c.metrics().total_hits, 2_000);
        assert_eq!(c.metrics().total_units, 20_000);
        assert_eq!(c.metrics().current_speed, 335);
    }

    #[test]
    fn pending_orders_are_startable() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut fleet = demo_fleet(FleetConfig::default(), ThroughputModel::default(), 3, now);
        let pending = &pending_orders()[0];
        let snap = fleet
            .start_order("machine-1", &pending.id, "12.345.678-9", pending.outputs, Some(pending.target), now)
            .unwrap();
        assert_eq!(snap.order.unwrap().operator_name, "Juan Pérez");
    }
}
