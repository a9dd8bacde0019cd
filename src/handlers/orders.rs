use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthMember;
use crate::services::orders::{CreateOrderRequest, OrderView};
use crate::services::payment_gateway::GatewayRedirect;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrderResponse {
    pub order_id: i32,
    #[schema(example = "ORD-20250521124901-0001")]
    pub order_no: String,
    /// Form the browser posts to the payment gateway
    pub redirect: GatewayRedirect,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FreeOrderResponse {
    pub order_id: i32,
    pub order_no: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InquiryQuery {
    /// Order number printed on the receipt
    pub order_no: String,
    /// Buyer email the order was placed with
    pub email: String,
}

/// Create an order awaiting payment
#[utoipa::path(
    post,
    path = "/api/orderTicketGroup",
    summary = "Create paid order",
    description = "Prices the selection against the catalog, stores the order as `initiate` and returns the gateway redirect",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<PaidOrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request, unsellable ticket or bank", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid bearer token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number collision", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security((), ("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_paid_order(
    State(state): State<AppState>,
    member: Option<AuthMember>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaidOrderResponse>>), ServiceError> {
    let checkout = state
        .services
        .orders
        .create_paid(member.as_ref(), request)
        .await?;

    let response = PaidOrderResponse {
        order_id: checkout.created.order.id,
        order_no: checkout.created.order.order_no,
        redirect: checkout.redirect,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Create a zero-priced order
#[utoipa::path(
    post,
    path = "/api/orderTicketGroup/free",
    summary = "Create free order",
    description = "Stores a zero-total order directly as `success`; tickets are issued and mailed by the delivery worker",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<FreeOrderResponse>),
        (status = 400, description = "Invalid request or non-zero total", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid bearer token", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security((), ("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_free_order(
    State(state): State<AppState>,
    member: Option<AuthMember>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<FreeOrderResponse>>), ServiceError> {
    let created = state
        .services
        .orders
        .create_free(member.as_ref(), request)
        .await?;

    let response = FreeOrderResponse {
        order_id: created.order.id,
        order_no: created.order.order_no,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Look up an order without an account
#[utoipa::path(
    get,
    path = "/api/orderTicketGroup/inquiry",
    summary = "Guest order inquiry",
    params(InquiryQuery),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderView>),
        (status = 400, description = "Missing orderNo or email", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order with that number and email", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn inquire_order(
    State(state): State<AppState>,
    Query(query): Query<InquiryQuery>,
) -> ApiResult<OrderView> {
    let view = state
        .services
        .orders
        .inquire_by_order_no_email(&query.order_no, &query.email)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Read one of the signed-in member's orders
#[utoipa::path(
    get,
    path = "/api/orderTicketGroup/{id}",
    summary = "Get member order",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderView>),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_member_order(
    State(state): State<AppState>,
    member: AuthMember,
    Path(id): Path<i32>,
) -> ApiResult<OrderView> {
    let view = state
        .services
        .orders
        .get_member_order(id, member.cust_id)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
