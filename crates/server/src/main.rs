use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use server_api::{get_status, post_status, ApiContext};
use shared::{
    domain::ParkingStatus,
    error::{ApiError, ErrorCode},
    protocol::{StatusUpdateRequest, StatusUpdateResponse, HEALTH_ROUTE, STATUS_ROUTE},
};
use storage::StatusStore;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_BODY_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let store = StatusStore::open(&settings.store_config()).await;
    info!(backend = %store.backend_kind(), "status store ready");

    let state = AppState {
        api: ApiContext { store },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_ROUTE, get(healthz))
        .route(STATUS_ROUTE, get(http_get_status).post(http_post_status))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_get_status(State(state): State<Arc<AppState>>) -> Json<ParkingStatus> {
    Json(get_status(&state.api).await)
}

async fn http_post_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<StatusUpdateResponse>, (StatusCode, Json<ApiError>)> {
    let Json(request) = payload.map_err(|rejection| {
        let status = match &rejection {
            JsonRejection::JsonSyntaxError(_) | JsonRejection::JsonDataError(_) => {
                StatusCode::BAD_REQUEST
            }
            other => other.status(),
        };
        (
            status,
            Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
        )
    })?;

    let response = post_status(&state.api, request)
        .await
        .map_err(|e| (status_for(e.code), Json(e)))?;
    Ok(Json(response))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Storage | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
