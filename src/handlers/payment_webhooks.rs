use crate::{errors::ApiError, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the provider's `t=,v1=` payload signature.
const SIGNATURE_HEADER: &str = "gateway-signature";

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    reference: String,
}

/// Asynchronous confirmation path pushed by the payment provider.
///
/// Signature failures are rejected with 400. Everything that was processed,
/// including replays and events for already-settled orders, answers 2xx so
/// the provider stops retrying; only transient failures (store or gateway
/// unavailable) answer 5xx, which is exactly the case where a retry helps.
#[utoipa::path(
    post,
    path = "/api/v1/orders/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook processed (possibly a no-op)"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse),
        (status = 502, description = "Transient failure, provider should retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn gateway_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".to_string()))?;

    if !state
        .services
        .gateway
        .verify_webhook_signature(&body, signature)
    {
        warn!("Webhook signature verification failed");
        return Err(ApiError::BadRequest("Invalid webhook signature".to_string()));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    match payload.event.as_str() {
        "charge.success" | "charge.failed" => {}
        other => {
            info!(event = %other, "Unhandled webhook event type");
            return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response());
        }
    }

    let order = match state
        .services
        .orders
        .find_by_gateway_reference(&payload.reference)
        .await
        .map_err(ApiError::ServiceError)?
    {
        Some(order) => order,
        None => {
            warn!(reference = %payload.reference, "Webhook for unknown session reference");
            return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response());
        }
    };

    match state.services.orders.confirm_payment(order.id, None).await {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "processed",
                "order_id": outcome.order_id,
                "payment_status": outcome.payment_status,
            })),
        )
            .into_response()),
        Err(e) if e.is_transient() => {
            // 5xx: the provider's retry mechanism is the recovery path.
            Err(ApiError::ServiceError(e))
        }
        Err(e) => {
            // Absorbed into the order's terminal state; never bounce a
            // non-transient failure back as a retryable error.
            warn!(order_id = %order.id, error = %e, "Webhook confirmation absorbed");
            Ok((
                StatusCode::OK,
                Json(json!({
                    "status": "absorbed",
                    "order_id": order.id,
                })),
            )
                .into_response())
        }
    }
}
