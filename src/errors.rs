use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error payload returned by every handler.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable reason code where one exists (coupon and gateway
    /// rejections), so clients can branch without parsing messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Distinct user-facing rejection reasons from coupon validation. Each maps
/// to a stable `reason` code in the response body.
#[derive(Debug, Clone, thiserror::Error, Serialize, PartialEq, Eq)]
pub enum CouponError {
    #[error("Coupon code not found")]
    NotFound,

    #[error("Coupon is not active")]
    Inactive,

    #[error("Coupon is outside its validity window")]
    Expired,

    #[error("Coupon usage limit has been reached")]
    UsageLimitReached,

    #[error("Order amount {order_amount} is below the coupon minimum of {minimum}")]
    MinimumOrderAmount {
        minimum: rust_decimal::Decimal,
        order_amount: rust_decimal::Decimal,
    },

    #[error("Coupon has already been used the maximum number of times by this shopper")]
    PerUserLimitReached,

    #[error("No item in the order belongs to a category this coupon applies to")]
    CategoryNotApplicable,

    #[error("The order contains items from a category excluded by this coupon")]
    CategoryExcluded,

    #[error("Shopper is not eligible for this coupon ({required})")]
    NotEligible { required: String },
}

impl CouponError {
    /// Stable machine-readable code for the response body.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::NotFound => "coupon_not_found",
            Self::Inactive => "coupon_inactive",
            Self::Expired => "coupon_expired",
            Self::UsageLimitReached => "coupon_usage_limit_reached",
            Self::MinimumOrderAmount { .. } => "coupon_minimum_order_amount",
            Self::PerUserLimitReached => "coupon_per_user_limit_reached",
            Self::CategoryNotApplicable => "coupon_category_not_applicable",
            Self::CategoryExcluded => "coupon_category_excluded",
            Self::NotEligible { .. } => "coupon_not_eligible",
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::Coupon(_) | Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GatewayUnavailable(_) | Self::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            Self::VerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Whether a retry by the caller can plausibly succeed. The webhook
    /// transport answers 5xx only for these, so the provider redelivers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::GatewayUnavailable(_)
                | Self::InternalError(_)
                | Self::Other(_)
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Machine-readable reason code, where the taxonomy defines one.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Coupon(err) => Some(err.reason_code()),
            Self::GatewayUnavailable(_) => Some("gateway_unavailable"),
            Self::GatewayRejected(_) => Some("gateway_rejected"),
            Self::VerificationFailed(_) => Some("verification_failed"),
            Self::InsufficientStock(_) => Some("insufficient_stock"),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            reason: self.reason_code().map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, reason) = match &self {
            ApiError::ServiceError(service_error) => (
                service_error.status_code(),
                service_error.response_message(),
                service_error.reason_code().map(str::to_string),
            ),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            reason,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
