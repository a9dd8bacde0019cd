use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::common::parse_admit_date;
use crate::models::Trilingual;
use crate::services::variants::Variant;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TicketVariantsQuery {
    pub ticket_group_id: i32,
    /// Admission date, `yyyy-mm-dd`
    pub date: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketVariantsResponse {
    pub ticket_group_id: i32,
    pub group_name: Trilingual,
    pub variants: Vec<Variant>,
}

/// Variants sellable for a ticket group on a date
#[utoipa::path(
    get,
    path = "/api/ticketGroups/ticketVariants",
    summary = "List ticket variants",
    params(TicketVariantsQuery),
    responses(
        (status = 200, description = "Sellable variants in display order", body = ApiResponse<TicketVariantsResponse>),
        (status = 400, description = "Bad date, unknown or inactive group", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn list_ticket_variants(
    State(state): State<AppState>,
    Query(query): Query<TicketVariantsQuery>,
) -> ApiResult<TicketVariantsResponse> {
    let date = parse_admit_date(&query.date)?;
    let resolution = state
        .services
        .variants
        .resolve(query.ticket_group_id, date)
        .await?;

    Ok(Json(ApiResponse::success(TicketVariantsResponse {
        ticket_group_id: resolution.group.ticket_group_id,
        group_name: resolution.group.name,
        variants: resolution.variants,
    })))
}
