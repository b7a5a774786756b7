//! Reference barrier - accepts forwarded events and logs them.
//!
//! Answers `202 Accepted` for any body that decodes as one of the event
//! shapes and `400` otherwise. Nothing is stored.
//!
//! ## Configuration
//!
//! - `IFLOGS_CONFIG`: path to the TOML config; `[collector].port` is the
//!   listen port (default: 9000)
//! - `PORT`: overrides the configured port
//! - `RUST_LOG`: logging level (default: "info")

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use iflogs::config::IflogsConfig;
use iflogs::shutdown::ShutdownSignal;
use iflogs::Event;

/// Collector counters
struct Metrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    dotenvy::dotenv().ok();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Barrier stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IflogsConfig::load()?;
    let port = match env::var("PORT") {
        Ok(raw) => raw.parse::<u16>()?,
        Err(_) => config.collector.port,
    };

    let metrics = Arc::new(Metrics::new());
    let app = Router::new()
        .route("/", post(receive_event))
        .route("/events", post(receive_event))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .with_state(metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Barrier listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(ShutdownSignal::new().wait())
        .await?;

    Ok(())
}

async fn receive_event(State(metrics): State<Arc<Metrics>>, body: Bytes) -> (StatusCode, Json<Value>) {
    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, bytes = body.len(), "Rejected body that is not an event");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "rejected", "error": e.to_string() })),
            );
        }
    };

    metrics.accepted.fetch_add(1, Ordering::Relaxed);

    match &event {
        Event::Api(log) => info!(
            kind = "api",
            ip = %log.ip,
            path = %log.path,
            method = %log.method,
            has_token = !log.token.is_empty(),
            "Event received"
        ),
        Event::Auth(log) => info!(
            kind = "auth",
            ip = %log.ip,
            client = %log.client,
            "Event received"
        ),
    }
    debug!(kind = %event.kind(), "Event accepted");

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_metrics(State(metrics): State<Arc<Metrics>>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": metrics.start_time.elapsed().as_secs(),
        "events": {
            "accepted": metrics.accepted.load(Ordering::Relaxed),
            "rejected": metrics.rejected.load(Ordering::Relaxed),
        },
    }))
}
