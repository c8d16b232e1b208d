//! The HTTP boundary: dashboard and history queries for the presentation
//! layer, and the four control operations for operator terminals.
//!
//! Every JSON response carries `Cache-Control: no-store`.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::TimeDelta;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Body;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    pin,
    sync::{watch, Semaphore, TryAcquireError},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use pl_core::{SeriesPoint, Timestamp, WorkOrderRecord};
use pl_fleet::FleetError;
use pl_views::{
    aggregate, production_summary, search_work_orders, work_orders_in_period, worker_summary,
    DashboardSummary, PeriodFilter, Window, DEFAULT_SEARCH_LIMIT,
};

use crate::engine::{shutdown_requested, FleetHandle};
use crate::store::{query_minutes, MinuteStore, StoreError};

type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// How long open connections get to finish after shutdown before they are
/// aborted.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn full<T: Into<Bytes>>(chunk: T) -> ResponseBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Where `/dashboard` gets its per-minute series from.
pub enum SeriesSource {
    Simulated,
    Store {
        store: Arc<dyn MinuteStore>,
        window: TimeDelta,
        timeout: Duration,
    },
}

pub struct AppState {
    pub fleet: FleetHandle,
    /// Historical orders, newest first.
    pub catalog: Vec<WorkOrderRecord>,
    pub series: SeriesSource,
}

impl AppState {
    /// Orders finished by this process, newest first, ahead of the catalogue.
    fn work_orders(&self) -> Vec<WorkOrderRecord> {
        let mut records = self.fleet.completed_orders();
        records.reverse();
        records.extend(self.catalog.iter().cloned());
        records
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary, StoreError> {
        let now = self.fleet.clock().now();
        match &self.series {
            SeriesSource::Simulated => {
                let window = Window { start: pl_scenarios::simulated_start(), end: now };
                Ok(aggregate(pl_scenarios::simulated_dashboard_series(), window))
            }
            SeriesSource::Store { store, window, timeout } => {
                let window = Window { start: now - *window, end: now };
                let docs = query_minutes(Arc::clone(store), window.start, window.end, *timeout).await?;
                let series: Vec<SeriesPoint> = docs.into_iter().map(SeriesPoint::from).collect();
                Ok(aggregate(series, window))
            }
        }
    }
}

#[derive(Debug)]
enum ApiError {
    Fleet(FleetError),
    Upstream,
    BadRequest(String),
    NotFound,
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        ApiError::Fleet(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn into_response(self) -> Response<ResponseBody> {
        let (status, error, message) = match self {
            ApiError::Fleet(err) => {
                let (status, kind) = match err {
                    FleetError::UnknownMachine(_) => (StatusCode::NOT_FOUND, "unknown_machine"),
                    FleetError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
                    FleetError::InvalidOrder(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_order"),
                    FleetError::SimulationFault { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "simulation_fault")
                    }
                };
                (status, kind, err.to_string())
            }
            ApiError::Upstream => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
                "minute counts are unavailable, retry later".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found", "no such route".to_string()),
        };
        json(status, &ErrorBody { error, message })
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(err) => {
            error!("response serialization failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, b"{}".to_vec())
        }
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .body(full(body))
        .expect("Creating HTTP response should not fail")
}

fn ok<T: Serialize>(value: &T) -> Result<Response<ResponseBody>, ApiError> {
    Ok(json(StatusCode::OK, value))
}

fn parse_query<'de, T: Deserialize<'de>>(query: &'de str) -> Result<T, ApiError> {
    serde_urlencoded::from_str(query).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn parse_body<T, B>(body: B) -> Result<T, ApiError>
where
    T: for<'de> Deserialize<'de>,
    B: Body,
    B::Error: Display,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[derive(Deserialize)]
struct OrderSearch {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct WorkerQuery {
    name: String,
}

#[derive(Deserialize)]
struct PeriodQuery {
    p: String,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl PeriodQuery {
    fn filter(&self) -> Result<PeriodFilter, ApiError> {
        if self.p == "custom" {
            return Ok(PeriodFilter::Custom { start: self.start, end: self.end });
        }
        self.p.parse().map_err(ApiError::BadRequest)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    ot_id: String,
    operator_rut: String,
    outputs_per_stroke: u32,
    target_units: Option<u64>,
}

#[derive(Deserialize)]
struct PauseBody {
    reason: String,
}

async fn route<B>(state: &AppState, req: Request<B>) -> Result<Response<ResponseBody>, ApiError>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let fleet = &state.fleet;

    match (&method, segments.as_slice()) {
        (&Method::GET, ["dashboard"]) => {
            fleet.metrics().inc_dashboard_requests(1);
            match state.dashboard().await {
                Ok(summary) => ok(&summary),
                Err(err) => {
                    fleet.metrics().inc_upstream_failures(1);
                    warn!(error = %err, "dashboard query failed");
                    Err(ApiError::Upstream)
                }
            }
        }
        (&Method::GET, ["history", "ot"]) => {
            fleet.metrics().inc_history_requests(1);
            let search: OrderSearch = parse_query(&query)?;
            let limit = search.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
            ok(&search_work_orders(&state.work_orders(), &search.q, limit))
        }
        (&Method::GET, ["history", "worker"]) => {
            fleet.metrics().inc_history_requests(1);
            let worker: WorkerQuery = parse_query(&query)?;
            ok(&worker_summary(&state.work_orders(), &worker.name))
        }
        (&Method::GET, ["history", "period"]) => {
            fleet.metrics().inc_history_requests(1);
            let period: PeriodQuery = parse_query(&query)?;
            let filter = period.filter()?;
            let selection = work_orders_in_period(&state.work_orders(), filter, fleet.clock().now());

            #[derive(Serialize)]
            struct PeriodView {
                #[serde(flatten)]
                selection: pl_views::PeriodSelection,
                summary: Option<pl_views::ProductionSummary>,
            }
            let summary = production_summary(&selection.records);
            ok(&PeriodView { selection, summary })
        }
        (&Method::GET, ["counters"]) => ok(&fleet.metrics().snapshot()),
        (&Method::GET, ["machines"]) => ok(&fleet.snapshots()),
        (&Method::GET, ["machines", id]) => ok(&fleet.snapshot(id)?),
        (&Method::POST, ["machines", id, action]) => {
            let snapshot = match *action {
                "start" => {
                    let body: StartBody = parse_body(req.into_body()).await?;
                    fleet.start_order(
                        id,
                        &body.ot_id,
                        &body.operator_rut,
                        body.outputs_per_stroke,
                        body.target_units,
                    )?
                }
                "stop" => fleet.stop_order(id)?,
                "pause" => {
                    let body: PauseBody = parse_body(req.into_body()).await?;
                    fleet.pause(id, &body.reason)?
                }
                "resume" => fleet.resume(id)?,
                _ => return Err(ApiError::NotFound),
            };
            ok(&snapshot)
        }
        _ => Err(ApiError::NotFound),
    }
}

async fn handle<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> Result<Response<ResponseBody>, hyper::Error>
where
    B: Body,
    B::Error: Display,
{
    debug!(method = %req.method(), uri = %req.uri(), "request");
    Ok(route(&state, req).await.unwrap_or_else(ApiError::into_response))
}

pub async fn serve(
    addr: SocketAddr,
    concurrency_limit: usize,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "http listening");
    serve_listener(listener, concurrency_limit, state, shutdown).await
}

/// Accept loop over an already bound listener. On shutdown every open
/// connection is told to finish its in-flight request and close; whatever is
/// still open after [`DRAIN_TIMEOUT`] is aborted.
pub async fn serve_listener(
    listener: TcpListener,
    concurrency_limit: usize,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let sem = Arc::new(Semaphore::new(concurrency_limit.max(1)));
    let mut join_set = JoinSet::new();
    let conn_shutdown = shutdown.clone();

    let shutdown_fut = shutdown_requested(&mut shutdown);
    pin!(shutdown_fut);
    loop {
        tokio::select! {
            () = &mut shutdown_fut => {
                info!("Shutdown signal received, stopping accept loop.");
                break;
            }

            incoming = listener.accept() => {
                let (stream, addr) = match incoming {
                    Ok(sa) => sa,
                    Err(e) => {
                        error!("Error accepting connection: {e}");
                        continue;
                    }
                };
                debug!("Accepted connection from {addr}");

                let sem = Arc::clone(&sem);
                let state = Arc::clone(&state);
                let mut conn_shutdown = conn_shutdown.clone();
                join_set.spawn(async move {
                    let permit = match sem.try_acquire() {
                        Ok(p) => p,
                        Err(TryAcquireError::Closed) => {
                            error!("Semaphore closed");
                            return;
                        }
                        Err(TryAcquireError::NoPermits) => {
                            warn!("httpd over connection capacity, load shedding");
                            drop(stream);
                            return;
                        }
                    };

                    let service = hyper::service::service_fn(move |req| handle(Arc::clone(&state), req));
                    let builder = auto::Builder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    pin!(conn);
                    let served = tokio::select! {
                        res = conn.as_mut() => res,
                        () = shutdown_requested(&mut conn_shutdown) => {
                            debug!("closing connection from {addr} for shutdown");
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = served {
                        error!("Error serving {addr}: {e}");
                    }
                    drop(permit);
                });
            }
        }
    }

    drop(listener);
    let drain = async { while join_set.join_next().await.is_some() {} };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(open = join_set.len(), "connections still open after drain timeout, aborting");
        join_set.abort_all();
    }
    Ok(())
}
