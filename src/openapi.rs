use axum::{response::Json, routing::get, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Zoo Ticketing API",
        version = "1.0.0",
        description = r#"
Online ticket sales for the zoo.

Buyers pick ticket variants for an admission date and pay through the JP
payment gateway (card or FPX). The gateway reports the outcome to
`/api/payment/callback`; paid and free orders are then issued tickets and
emailed by a background delivery worker.

Members may send `Authorization: Bearer <token>` to link orders to their
account. Guests look orders up with the order number and buyer email.
"#
    ),
    tags(
        (name = "orders", description = "Order creation and lookup"),
        (name = "payments", description = "Payment gateway callback"),
        (name = "catalog", description = "Ticket variants")
    ),
    paths(
        crate::handlers::orders::create_paid_order,
        crate::handlers::orders::create_free_order,
        crate::handlers::orders::inquire_order,
        crate::handlers::orders::get_member_order,
        crate::handlers::payment_callback::payment_callback,
        crate::handlers::ticket_variants::list_ticket_variants,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::TicketSelection,
            crate::services::orders::BuyerDetails,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::payment_gateway::GatewayCallback,
            crate::services::payment_gateway::GatewayRedirect,
            crate::services::variants::Variant,
            crate::handlers::orders::PaidOrderResponse,
            crate::handlers::orders::FreeOrderResponse,
            crate::handlers::ticket_variants::TicketVariantsResponse,
            crate::models::TransactionStatus,
            crate::models::Trilingual,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn docs_routes() -> Router {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_endpoints() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("/api/orderTicketGroup"));
        assert!(json.contains("/api/orderTicketGroup/inquiry"));
        assert!(json.contains("/api/payment/callback"));
        assert!(json.contains("/api/ticketGroups/ticketVariants"));
        assert!(json.contains("Bearer"));
    }
}
