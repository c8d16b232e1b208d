use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::TimeDelta;
use clap::Parser;
use tracing::{info, warn};

use pl_runtime::metrics::{MetricsRegistry, RunTimer};
use pl_runtime::{init_tracing, Clock, FleetHandle, ManualClock, Settings, SystemClock};
use pl_scenarios::{demo_fleet, pending_orders, workers};

/// Drives the demo floor for a fixed number of ticks and prints what the
/// operator screen would show.
#[derive(Parser, Debug)]
#[command(name = "fleet_demo")]
#[command(about = "Simulate the press floor without the HTTP surface")]
struct Args {
    /// Optional TOML settings file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Random seed for speed fluctuations.
    #[arg(long)]
    seed: Option<u64>,

    /// Ticks to run.
    #[arg(long, default_value_t = 120)]
    ticks: u32,

    /// Sleep for the configured tick interval between ticks instead of
    /// advancing a simulated clock.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if args.seed.is_some() {
        settings.engine.seed = args.seed;
    }

    let manual = ManualClock::new(chrono::Utc::now());
    let clock: Arc<dyn Clock> =
        if args.realtime { Arc::new(SystemClock) } else { Arc::new(manual.clone()) };
    let now = clock.now();
    let seed = settings.engine.seed_or_clock(now);
    info!(seed, ticks = args.ticks, realtime = args.realtime, "fleet_demo starting");

    let fleet = demo_fleet(
        settings.engine.fleet_config(),
        settings.engine.throughput_model(),
        seed,
        now,
    );
    let handle = FleetHandle::new(fleet, clock, MetricsRegistry::default());

    let order = pending_orders().into_iter().next();
    let operator = workers().into_iter().next();
    if let (Some(order), Some(operator)) = (order, operator) {
        let snap = handle.start_order(
            "machine-1",
            &order.id,
            &operator.rut,
            order.outputs,
            Some(order.target),
        )?;
        info!(machine = %snap.name, order = %order.id, client = %order.client, "order started");
    }

    let interval = settings.engine.tick_interval();
    let step = TimeDelta::from_std(interval).unwrap_or(TimeDelta::seconds(1));
    let pause_at = args.ticks / 3;
    let resume_at = pause_at * 2;
    let timer = RunTimer::start();

    for tick in 1..=args.ticks {
        if args.realtime {
            std::thread::sleep(interval);
        } else {
            manual.advance(step);
        }
        let outcome = handle.tick();
        for err in &outcome.faults {
            warn!(error = %err, "machine skipped this tick");
        }

        if tick == pause_at {
            handle.pause("machine-1", "Cambio de matriz")?;
            info!(tick, "machine-1 paused");
        } else if tick == resume_at {
            let snap = handle.resume("machine-1")?;
            if let Some(stop) = snap.stops.last() {
                let row = stop.row();
                info!(
                    tick,
                    from = %row.start_time,
                    to = %row.end_time,
                    duration = %row.duration,
                    reason = %row.reason,
                    "machine-1 resumed"
                );
            }
        }
    }

    for snap in handle.snapshots() {
        let order = snap.order.as_ref().map_or("-", |o| o.id.as_str());
        info!(
            machine = %snap.name,
            order,
            hits = snap.metrics.total_hits,
            units = snap.metrics.total_units,
            speed = snap.metrics.current_speed,
            min = snap.metrics.min_speed,
            max = snap.metrics.max_speed,
            std_dev = format!("{:.2}", snap.metrics.standard_deviation),
            progress = ?snap.progress.map(|p| format!("{p:.1}%")),
            "machine"
        );
    }

    let finished = handle.stop_order("machine-1")?;
    info!(status = ?finished.status, "machine-1 stopped");
    for record in handle.completed_orders() {
        println!("{}", serde_json::to_string(&record)?);
    }
    println!(
        "{}",
        handle.metrics().snapshot().to_json_line("fleet_demo", Some(timer.elapsed()))
    );
    Ok(())
}
