use crate::handlers::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    entities::{order, order_item},
    errors::ApiError,
    services::orders::{ConfirmationOutcome, CreateOrderRequest},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for order endpoints. The webhook route lives in
/// `payment_webhooks` but is mounted under the same prefix.
pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/confirm", post(confirm_order))
        .route("/webhook", post(super::payment_webhooks::gateway_webhook))
        .route("/:order_id", get(get_order))
        .route("/:order_id/status", put(update_order_status))
}

/// Checkout: create a pending order and open a gateway session.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created, shopper must be redirected to the gateway"),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Coupon rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable or rejected", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let response = state
        .services
        .orders
        .create_order(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(response))
}

/// Browser-return confirmation path. Races freely with the provider
/// webhook; repeats are idempotent no-ops.
#[utoipa::path(
    post,
    path = "/api/v1/orders/confirm",
    request_body = ConfirmOrderRequest,
    responses(
        (status = 200, description = "Final order status", body = ConfirmOrderResponse),
        (status = 402, description = "Verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .orders
        .confirm_payment(payload.order_id, Some(&payload.session_reference))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ConfirmOrderResponse::from(outcome)))
}

/// Fetch an order with its snapshot lines.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with snapshot line items"),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .orders
        .get_order(order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(OrderDetailsResponse {
        order: details.order,
        items: details.items,
    }))
}

/// Administrative fulfillment progression (shipping pipeline).
#[utoipa::path(
    put,
    path = "/api/v1/orders/{order_id}/status",
    params(("order_id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated order"),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .orders
        .update_order_status(order_id, payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(updated))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmOrderRequest {
    pub order_id: Uuid,
    pub session_reference: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmOrderResponse {
    pub order_id: Uuid,
    pub payment_status: order::PaymentStatus,
    pub order_status: order::OrderStatus,
    pub already_confirmed: bool,
    /// Present when payment was captured but the stock commit failed; the
    /// order stays confirmed and reconciliation is an operator follow-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_error: Option<String>,
}

impl From<ConfirmationOutcome> for ConfirmOrderResponse {
    fn from(outcome: ConfirmationOutcome) -> Self {
        Self {
            order_id: outcome.order_id,
            payment_status: outcome.payment_status,
            order_status: outcome.order_status,
            already_confirmed: !outcome.newly_confirmed,
            inventory_error: outcome.inventory_error,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: order::OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailsResponse {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}
