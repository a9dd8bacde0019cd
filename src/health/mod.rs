/*!
 * # Health Check Module
 *
 * - Health check (`/health`) - database ping plus uptime, 503 when the database is down
 * - Liveness check (`/health/live`) - process is up, no dependencies touched
 * - Version (`/health/version`)
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::db::{check_connection, DbPool};

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DbPool>,
    pub started: Instant,
}

impl HealthState {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            db_pool,
            started: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthInfo {
        let started = Instant::now();
        let ping = tokio::time::timeout(DB_CHECK_TIMEOUT, check_connection(&self.db_pool));
        let database = match ping.await {
            Ok(Ok(())) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
                latency_ms: started.elapsed().as_millis() as u64,
            },
            // check_connection already logged the cause
            Ok(Err(_)) => HealthDetail {
                status: HealthStatus::Down,
                message: Some("database unreachable".to_string()),
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(_) => {
                error!("database health check timed out");
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some("database ping timed out".to_string()),
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        let mut details = BTreeMap::new();
        details.insert("database".to_string(), database);
        let status = if details.values().all(|d| d.status == HealthStatus::Up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };

        HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            details,
        }
    }
}

/// Health check with database ping
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("health check called");
    let health = state.check().await;
    let status_code = match health.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "uptime_seconds": state.started.elapsed().as_secs(),
        "timestamp": Utc::now(),
    }))
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Router mounted under `/health`
pub fn health_routes(db_pool: Arc<DbPool>) -> Router {
    let state = Arc::new(HealthState::new(db_pool));
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(state)
}
