use crate::rebalance::{RebalanceReport, RebalanceStatus, RebalanceTrigger, TriggerSource};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub trigger: Arc<RebalanceTrigger>,
}

#[derive(Serialize)]
struct HealthDto {
    status: &'static str,
    version: u64,
    last_rebalance_failed: bool,
}

#[derive(Serialize)]
struct RebalanceResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RebalanceReport>,
}

// API endpoints
// - GET  /health
//   Liveness of the coordinator, with the committed version and whether the last rebalance failed.
//
// - GET  /status
//   Read-only status of the assignment: version, coverage, imbalance, per-account channel counts,
//   time of the last commit, accounts changed by it, the redistribution summary and the last error.
//
// - POST /rebalance
//   Runs a rebalance now. A request arriving while a rebalance is running waits for it to finish
//   and then runs its own. Returns the committed report, or 503 when the rebalance was aborted.
//   A client that disconnects early does not cancel the rebalance.
//
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/rebalance", post(rebalance_now))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    let status = state.trigger.status().await;
    Json(HealthDto {
        status: "ok",
        version: status.version,
        last_rebalance_failed: status.last_error.is_some(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<RebalanceStatus> {
    Json(state.trigger.status().await)
}

async fn rebalance_now(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("rebalance requested by operator");

    match state.trigger.run_rebalance(TriggerSource::Operator).await {
        Ok(report) => {
            let out = RebalanceResponse {
                success: true,
                message: format!("assignment version {} committed", report.version),
                report: Some(report),
            };
            Json(out).into_response()
        }
        Err(e) => {
            let out = RebalanceResponse {
                success: false,
                message: format!("{:#}", e),
                report: None,
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(out)).into_response()
        }
    }
}

/// Serves the admin API until `shutdown` flips to true.
pub async fn run(
    addr: SocketAddr,
    trigger: Arc<RebalanceTrigger>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let router = build_router(Arc::new(AppState { trigger }));

    info!("Starting admin API on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
