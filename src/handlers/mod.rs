use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        carts::CartService, coupons::CouponService, inventory::InventoryService,
        orders::OrderService, payments::PaymentGateway,
    },
    AppState,
};
use axum::Router;
use std::sync::Arc;

pub mod carts;
pub mod common;
pub mod orders;
pub mod payment_webhooks;

/// Container wiring the pipeline's services together.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub carts: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub inventory: Arc<InventoryService>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let coupons = Arc::new(CouponService::new(db.clone()));
        let inventory = Arc::new(InventoryService::new(
            db.clone(),
            event_sender.clone(),
            config.notifications.clone(),
        ));
        let carts = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db,
            event_sender,
            coupons.clone(),
            inventory.clone(),
            carts.clone(),
            gateway.clone(),
            config.gateway.callback_base_url.clone(),
        ));

        Self {
            orders,
            carts,
            coupons,
            inventory,
            gateway,
        }
    }
}

/// All pipeline routes, mounted by `lib.rs` under `/api/v1`.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/orders", orders::order_routes())
        .nest("/carts", carts::cart_routes())
}
