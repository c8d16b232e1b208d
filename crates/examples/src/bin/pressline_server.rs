use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::TimeDelta;
use clap::Parser;
use rand::{rngs::SmallRng, SeedableRng};
use tokio::sync::watch;
use tracing::{error, info};

use pl_runtime::http::{serve, AppState, SeriesSource};
use pl_runtime::metrics::MetricsRegistry;
use pl_runtime::store::{JsonLinesStore, MinuteStore};
use pl_runtime::{
    init_tracing, run_ticker, start_runtime, Clock, DashboardSource, FleetHandle, Settings,
    SystemClock,
};
use pl_scenarios::{demo_fleet, generate_work_orders, random_minute_documents};

/// Serves the operator terminal, dashboard and history APIs over a simulated
/// press floor.
#[derive(Parser, Debug)]
#[command(name = "pressline_server")]
#[command(about = "Pressline production monitoring server")]
struct Args {
    /// Optional TOML settings file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides `server.bind`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// `simulated` or `store`.
    #[arg(long)]
    source: Option<DashboardSource>,

    /// Random seed for the engine and the demo catalogue.
    #[arg(long)]
    seed: Option<u64>,

    /// Write a day of random minute counts to the store before serving.
    #[arg(long)]
    seed_store: bool,

    /// Tokio worker threads.
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.server.bind = bind;
    }
    if let Some(source) = args.source {
        settings.server.dashboard_source = source;
    }
    if args.seed.is_some() {
        settings.engine.seed = args.seed;
    }

    start_runtime(args.workers, || async move {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = clock.now();
        let seed = settings.engine.seed_or_clock(now);
        info!(
            seed,
            bind = %settings.server.bind,
            source = ?settings.server.dashboard_source,
            "pressline_server starting"
        );

        let mut rng = SmallRng::seed_from_u64(seed);
        let catalog = generate_work_orders(settings.server.catalog_size, now, &mut rng);

        let series = match settings.server.dashboard_source {
            DashboardSource::Simulated => SeriesSource::Simulated,
            DashboardSource::Store => {
                let store = JsonLinesStore::new(&settings.store);
                if args.seed_store {
                    let docs = random_minute_documents(now, 24 * 60, &mut rng);
                    store.write_all(&docs)?;
                    info!(path = %store.path().display(), docs = docs.len(), "store seeded");
                }
                let store: Arc<dyn MinuteStore> = Arc::new(store);
                SeriesSource::Store {
                    store,
                    window: TimeDelta::hours(settings.server.dashboard_window_hours),
                    timeout: settings.store.query_timeout(),
                }
            }
        };

        let fleet = demo_fleet(
            settings.engine.fleet_config(),
            settings.engine.throughput_model(),
            seed,
            now,
        );
        let handle = FleetHandle::new(fleet, clock, MetricsRegistry::default());
        let state = Arc::new(AppState { fleet: handle.clone(), catalog, series });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_ticker(
            handle.clone(),
            settings.engine.tick_interval(),
            shutdown_rx.clone(),
        ));
        let mut server = tokio::spawn(serve(
            settings.server.bind,
            settings.server.concurrent_requests_max,
            state,
            shutdown_rx,
        ));

        let finished_early = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("ctrl-c received, shutting down");
                None
            }
            joined = &mut server => Some(joined?),
        };
        let _ = shutdown_tx.send(true);
        ticker.await?;
        let served = match finished_early {
            Some(result) => result,
            None => server.await?,
        };
        if let Err(err) = &served {
            error!(error = %err, "http server failed");
        }
        println!("{}", handle.metrics().snapshot().to_json_line("pressline_server", None));
        served?;
        Ok::<(), anyhow::Error>(())
    })
}
