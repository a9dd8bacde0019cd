//! Zoo Ticketing API Library
//!
//! Order lifecycle, payment gateway callbacks, ticket provisioning and
//! email delivery for online zoo ticket sales.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use utoipa::ToSchema;

use crate::auth::MemberTokenVerifier;
use crate::db::DbPool;

/// Upper bound for one HTTP request; outbound gateway calls time out first.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub verifier: Arc<MemberTokenVerifier>,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: config::AppConfig, services: handlers::AppServices) -> Self {
        let verifier = Arc::new(MemberTokenVerifier::new(&config.jwt_secret));
        Self {
            db,
            config,
            services,
            verifier,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
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
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Core endpoints under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orderTicketGroup",
            post(handlers::orders::create_paid_order),
        )
        .route(
            "/orderTicketGroup/free",
            post(handlers::orders::create_free_order),
        )
        .route(
            "/orderTicketGroup/inquiry",
            get(handlers::orders::inquire_order),
        )
        .route(
            "/orderTicketGroup/:id",
            get(handlers::orders::get_member_order),
        )
        .route(
            "/payment/callback",
            post(handlers::payment_callback::payment_callback),
        )
        .route(
            "/ticketGroups/ticketVariants",
            get(handlers::ticket_variants::list_ticket_variants),
        )
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else if config.is_development() {
        ::tracing::info!("using permissive CORS in development");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("no CORS origins configured; cross-origin requests are refused");
        CorsLayer::new()
    }
}

/// Full application router with middleware applied
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let verifier = state.verifier.clone();
    let db = state.db.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "zooticket-api up" }))
        .nest("/api", api_routes())
        .layer(axum::middleware::from_fn_with_state(
            verifier,
            auth::member_auth_middleware,
        ))
        .with_state(state)
        .nest("/health", health::health_routes(db))
        .merge(openapi::docs_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::correlate_request,
        ))
}
