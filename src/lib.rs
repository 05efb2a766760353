//! Storefront order pipeline.
//!
//! Converts a shopper's cart into a priced order, applies an optional
//! discount code, engages the payment gateway, and, once and only once
//! payment is confirmed, decrements inventory and destroys the cart. The
//! two confirmation paths (browser return and provider webhook) converge on
//! a single atomic claim over the order record; see `services::orders`.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use utoipa::OpenApi;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Assembles the full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/docs/openapi.json", get(openapi_json))
        .nest("/api/v1", handlers::api_v1_routes())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_order,
        handlers::orders::confirm_order,
        handlers::orders::get_order,
        handlers::orders::update_order_status,
        handlers::payment_webhooks::gateway_webhook,
        handlers::carts::get_cart,
        handlers::carts::add_item,
        handlers::carts::update_item,
        handlers::carts::remove_item,
    ),
    components(schemas(
        errors::ErrorResponse,
        entities::order::OrderStatus,
        entities::order::PaymentStatus,
        entities::order::ShipmentMethod,
        services::orders::CreateOrderRequest,
        services::orders::OrderLineInput,
        handlers::orders::ConfirmOrderRequest,
        handlers::orders::ConfirmOrderResponse,
        handlers::orders::UpdateOrderStatusRequest,
        handlers::carts::AddItemRequest,
        handlers::carts::UpdateItemRequest,
        handlers::carts::CartResponse,
        handlers::carts::CartLineResponse,
    )),
    tags(
        (name = "Orders", description = "Checkout, confirmation and fulfillment"),
        (name = "Carts", description = "Per-shopper cart management")
    )
)]
pub struct ApiDoc;
