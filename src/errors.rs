use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every core endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Validation error: ticketId TIC-X-0001 is not sold on 2025-05-21",
    "request_id": "req-abc123xyz",
    "timestamp": "2025-05-21T04:49:01.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ticket group not found: {0}")]
    CatalogMiss(String),

    #[error("Ticket group inactive: {0}")]
    Inactive(String),

    #[error("Unknown bank: {0}")]
    UnknownBank(String),

    #[error("Bank is currently disabled: {0}")]
    DisabledBank(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Duplicate order number: {0}")]
    DuplicateCreation(String),

    /// An outbound dependency failed (timeout, transport, non-OK status)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// An outbound dependency answered with data we could not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Order persisted partially: {0}")]
    PartialPersist(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<crate::notifications::NotificationError> for ServiceError {
    fn from(err: crate::notifications::NotificationError) -> Self {
        ServiceError::Notification(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::CatalogMiss(_)
            | Self::Inactive(_)
            | Self::UnknownBank(_)
            | Self::DisabledBank(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::DuplicateCreation(_) => StatusCode::CONFLICT,
            Self::Upstream(_) | Self::Protocol(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::PartialPersist(_)
            | Self::Notification(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Upstream reasons stay in the logs; buyers only see a generic message.
    pub fn response_message(&self) -> String {
        match self {
            Self::Upstream(_) | Self::Protocol(_) => {
                "Service temporarily unavailable".to_string()
            }
            Self::DatabaseError(_) | Self::Internal(_) | Self::Notification(_) => {
                "Internal server error".to_string()
            }
            Self::PartialPersist(_) => "Order could not be created".to_string(),
            _ => self.to_string(),
        }
    }

    /// Transient failures are worth retrying on the next sweep
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_) | Self::DatabaseError(_) | Self::Notification(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
