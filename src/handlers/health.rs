use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::{
    store::{Collection, RecordStore},
    AppState,
};

/// Component health status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub store: ComponentHealth,
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness probe: the process answers.
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Health check that reads from the record store.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let result = state.store.list(Collection::Returns).await;
    let latency = started.elapsed().as_millis() as u64;

    let store = match result {
        Ok(_) => ComponentHealth {
            status: ComponentStatus::Up,
            message: format!("{} store reachable", state.config.store_backend),
            latency_ms: Some(latency),
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Down,
            message: format!("Store check failed: {}", e),
            latency_ms: Some(latency),
        },
    };

    let (status, code) = match store.status {
        ComponentStatus::Up => (ComponentStatus::Up, StatusCode::OK),
        ComponentStatus::Down => (ComponentStatus::Down, StatusCode::SERVICE_UNAVAILABLE),
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        store,
    };
    (code, Json(response))
}
