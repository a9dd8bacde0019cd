use axum::{extract::State, response::IntoResponse, Form};
use tracing::info;

use crate::services::payment_gateway::GatewayCallback;
use crate::{errors::ServiceError, AppState};

/// Server-to-server notification from the payment gateway
#[utoipa::path(
    post,
    path = "/api/payment/callback",
    summary = "Payment gateway callback",
    description = "Applies the gateway outcome to the order. Replays and late callbacks for settled orders are acknowledged without changing them.",
    request_body(content = GatewayCallback, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Callback accepted", body = String),
        (status = 400, description = "Missing order_no", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Form(callback): Form<GatewayCallback>,
) -> Result<impl IntoResponse, ServiceError> {
    // Run detached so a dropped gateway connection cannot abort the update.
    let orders = state.services.orders.clone();
    let outcome = tokio::spawn(async move { orders.apply_gateway_callback(&callback).await })
        .await
        .map_err(|e| ServiceError::Internal(format!("callback task failed: {}", e)))??;

    info!(
        order_no = %outcome.order_no,
        status = %outcome.status,
        changed = outcome.changed,
        "payment callback handled"
    );
    Ok("OK")
}
