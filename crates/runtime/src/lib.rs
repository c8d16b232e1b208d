//! Runtime for the Pressline engine: tracing bootstrap, configuration, the
//! shared fleet handle and its ticker, the minute-count store and the HTTP
//! boundary.

use std::future::Future;

use anyhow::Result;
use tracing::{info, Level};

pub mod clock;
pub mod config;
pub mod engine;
pub mod http;
pub mod metrics;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DashboardSource, EngineConfig, ServerConfig, Settings, StoreConfig};
pub use engine::{run_ticker, shutdown_requested, FleetHandle};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .try_init();
}

/// Build a multi-threaded tokio runtime and drive `f` to completion on it.
pub fn start_runtime<F, Fut>(workers: usize, f: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(%workers, "starting tokio runtime");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(f())
}
