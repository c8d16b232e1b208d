use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta};
use serde::Serialize;

use pl_core::{Timestamp, WorkOrderRecord};

pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Filters by case-insensitive substring on order id, operator or machine,
/// then truncates to `limit`.
pub fn search_work_orders(
    records: &[WorkOrderRecord],
    query: &str,
    limit: usize,
) -> Vec<WorkOrderRecord> {
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|r| needle.is_empty() || r.matches(&needle))
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodFilter {
    Today,
    /// Monday through Sunday.
    Week,
    /// The last 30 days.
    Month,
    Custom {
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    },
}

impl FromStr for PeriodFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(PeriodFilter::Today),
            "week" => Ok(PeriodFilter::Week),
            "month" => Ok(PeriodFilter::Month),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

fn start_of_day(date: NaiveDate) -> Timestamp {
    date.and_time(NaiveTime::default()).and_utc()
}

fn end_of_day(date: NaiveDate) -> Timestamp {
    start_of_day(date) + TimeDelta::days(1) - TimeDelta::nanoseconds(1)
}

impl PeriodFilter {
    pub fn bounds(&self, now: Timestamp) -> (Timestamp, Timestamp) {
        let today = now.date_naive();
        match *self {
            PeriodFilter::Today => (start_of_day(today), end_of_day(today)),
            PeriodFilter::Week => {
                let offset = i64::from(today.weekday().num_days_from_monday());
                let monday = today - TimeDelta::days(offset);
                (start_of_day(monday), end_of_day(monday + TimeDelta::days(6)))
            }
            PeriodFilter::Month => (now - TimeDelta::days(30), end_of_day(today)),
            PeriodFilter::Custom { start, end } => (
                start.unwrap_or(now - TimeDelta::days(7)),
                end.unwrap_or(now),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSelection {
    pub records: Vec<WorkOrderRecord>,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Orders whose start falls inside the period, bounds inclusive.
pub fn work_orders_in_period(
    records: &[WorkOrderRecord],
    period: PeriodFilter,
    now: Timestamp,
) -> PeriodSelection {
    let (start, end) = period.bounds(now);
    let records = records
        .iter()
        .filter(|r| r.start_time >= start && r.start_time <= end)
        .cloned()
        .collect();
    PeriodSelection { records, start, end }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartBucket {
    pub key: String,
    pub label: String,
    pub units: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
    pub total_units: u64,
    pub total_ots: usize,
    pub avg_efficiency: i64,
    pub chart: Vec<ChartBucket>,
}

/// Totals over a set of orders plus a chart grouped per hour, or per day when
/// the orders span more than a day or there are more than 20 of them.
pub fn production_summary(records: &[WorkOrderRecord]) -> Option<ProductionSummary> {
    let (first, last) = (records.first()?, records.last()?);
    let total_units = records.iter().map(|r| r.units_produced).sum();
    let efficiency_sum: f64 = records.iter().map(WorkOrderRecord::efficiency).sum();
    let avg_efficiency = (efficiency_sum / records.len() as f64).round() as i64;

    let span_days = (first.start_time - last.start_time).num_days().abs();
    let daily = span_days > 1 || records.len() > 20;

    let mut groups: BTreeMap<String, (String, u64)> = BTreeMap::new();
    for r in records {
        let (key, label) = if daily {
            (
                r.start_time.format("%Y-%m-%d").to_string(),
                r.start_time.format("%d/%m").to_string(),
            )
        } else {
            let key = r.start_time.format("%H:00").to_string();
            (key.clone(), key)
        };
        groups.entry(key).or_insert((label, 0)).1 += r.units_produced;
    }
    let chart = groups
        .into_iter()
        .map(|(key, (label, units))| ChartBucket { key, label, units })
        .collect();

    Some(ProductionSummary {
        total_units,
        total_ots: records.len(),
        avg_efficiency,
        chart,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    pub name: String,
    pub rut: String,
    pub total_ots: usize,
    pub total_units: u64,
    pub avg_speed: i64,
    /// One decimal, over inspected orders only.
    pub avg_quality: Option<f64>,
    pub recent: Vec<WorkOrderRecord>,
}

/// Aggregates one operator's orders. `records` is expected newest first.
pub fn worker_summary(records: &[WorkOrderRecord], name: &str) -> Option<WorkerSummary> {
    let mine: Vec<&WorkOrderRecord> = records.iter().filter(|r| r.worker_name == name).collect();
    let first = mine.first()?;
    let total_ots = mine.len();

    let qualities: Vec<f64> = mine.iter().filter_map(|r| r.quality).map(f64::from).collect();
    let avg_quality = (!qualities.is_empty())
        .then(|| (qualities.iter().sum::<f64>() / qualities.len() as f64 * 10.0).round() / 10.0);

    let speed_sum: f64 = mine.iter().map(|r| r.average_speed).sum();

    Some(WorkerSummary {
        name: name.to_string(),
        rut: first.rut.clone(),
        total_ots,
        total_units: mine.iter().map(|r| r.units_produced).sum(),
        avg_speed: (speed_sum / total_ots as f64).round() as i64,
        avg_quality,
        recent: mine.iter().take(10).map(|r| (*r).clone()).collect(),
    })
}
