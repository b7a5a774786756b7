//! Demo host application.
//!
//! Serves a few sample routes wrapped in the configured interception mode so
//! the forwarding path can be exercised end to end against a barrier.
//!
//! ## Configuration
//!
//! - `IFLOGS_CONFIG`: path to the TOML config (default: `config/iflogs.toml`)
//! - `RUST_LOG`: logging level (default: "info")

use axum::{
    extract::Path,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use iflogs::config::IflogsConfig;
use iflogs::shutdown::ShutdownSignal;
use iflogs::{decorate, gate, Interceptor, Mode};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    dotenvy::dotenv().ok();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Host stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IflogsConfig::load()?;
    let interceptor = config.build_interceptor();

    let app = build_app(interceptor, config.intercept.mode);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(
        addr = %addr,
        barrier = %config.barrier.url,
        mode = %config.intercept.mode,
        kind = %config.intercept.kind,
        "Host listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(ShutdownSignal::new().wait())
    .await?;

    info!("Host stopped");
    Ok(())
}

/// Sample routes behind the interceptor; `/health` stays outside it.
fn build_app(interceptor: Interceptor, mode: Mode) -> Router {
    let intercepted = Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/login", post(login));

    let intercepted = match mode {
        Mode::Gate => intercepted.layer(middleware::from_fn_with_state(interceptor, gate)),
        Mode::Decorator => intercepted.layer(middleware::from_fn_with_state(interceptor, decorate)),
    };

    Router::new()
        .route("/health", get(health_check))
        .merge(intercepted)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_orders() -> Json<Value> {
    Json(json!({ "orders": [] }))
}

async fn get_order(Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "id": id }))
}

async fn login() -> Json<Value> {
    Json(json!({ "status": "logged in" }))
}
