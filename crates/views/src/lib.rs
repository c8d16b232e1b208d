//! Reusable view builders over the engine's output: hour buckets, the
//! dashboard summary, and work-order history queries.

pub mod dashboard;
pub mod history;
pub mod series;

pub use dashboard::{aggregate, DashboardSummary, IncidentEvent, Window};
pub use history::{
    production_summary, search_work_orders, work_orders_in_period, worker_summary, ChartBucket,
    PeriodFilter, PeriodSelection, ProductionSummary, WorkerSummary, DEFAULT_SEARCH_LIMIT,
};
pub use series::{bucket_by_hour, truncate_to_hour};
