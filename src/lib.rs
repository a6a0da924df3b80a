//! StateSet RMA Library
//!
//! Return-merchandise and non-conformance report (NCR) tracking: branches file
//! return requests, the warehouse receives and grades them, graded items are
//! executed per disposition bucket and closed out. NCR documents record
//! quality incidents and can raise return requests for their lines.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod queries;
pub mod reports;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::OperatorDirectory;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::Clock;
use crate::store::RecordStore;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub event_sender: Arc<EventSender>,
    pub operators: Arc<OperatorDirectory>,
    pub clock: Arc<dyn Clock>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        event_sender: EventSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let operators = Arc::new(OperatorDirectory::from_config(&config.operators));
        let services = handlers::AppServices::new(
            store.clone(),
            event_sender.clone(),
            clock.clone(),
            config.batch_max_selection,
        );
        Self {
            config: Arc::new(config),
            store,
            event_sender,
            operators,
            clock,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<OperatorDirectory> {
    fn from_ref(state: &AppState) -> Self {
        state.operators.clone()
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            message: Some(message),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Versioned API routes. Each handler checks the caller's capability.
pub fn api_v1_routes() -> Router<AppState> {
    let health = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness_check));

    let returns = Router::new()
        .route(
            "/returns",
            get(handlers::returns::list_returns).post(handlers::returns::create_return),
        )
        .route("/returns/board", get(handlers::returns::disposition_board))
        .route("/returns/stream", get(handlers::returns::stream_returns))
        .route(
            "/returns/documented",
            post(handlers::returns::confirm_documented),
        )
        .route("/returns/:id", get(handlers::returns::get_return))
        .route("/returns/:id/receive", post(handlers::returns::receive_return))
        .route("/returns/:id/grade", post(handlers::returns::grade_return))
        .route(
            "/returns/:id/complete",
            post(handlers::returns::complete_return),
        );

    let ncr = Router::new()
        .route(
            "/ncr",
            get(handlers::ncr::list_ncr).post(handlers::ncr::create_ncr),
        )
        .route("/ncr/stream", get(handlers::ncr::stream_ncr))
        .route(
            "/ncr/:id",
            get(handlers::ncr::get_ncr).patch(handlers::ncr::update_ncr),
        )
        .route("/ncr/:id/cancel", post(handlers::ncr::cancel_ncr))
        .route(
            "/ncr/:id/items/:index/return-draft",
            get(handlers::ncr::return_draft),
        )
        .route(
            "/ncr/:id/items/:index/return",
            post(handlers::ncr::create_item_return),
        )
        .route("/ncr/:id/print", get(handlers::ncr::print_ncr));

    let reports = Router::new().route(
        "/reports/ncr.csv",
        get(handlers::reports::export_ncr_csv),
    );

    Router::new()
        .merge(health)
        .merge(returns)
        .merge(ncr)
        .merge(reports)
}

/// CORS from configuration: explicit origins when given, permissive in
/// development, same-origin only otherwise.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.is_development() {
        ::tracing::info!("Using permissive CORS in development");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router with request-id, tracing and CORS layers.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/", get(|| async { "stateset-rma up" }))
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}
