#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{coupon, customer, newsletter_subscription, order, order_item, product},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        coupons::CreateCouponInput,
        inventory::CreateProductInput,
        payments::{
            to_minor_units, GatewaySession, InitializeSessionRequest, PaymentGateway, Verification,
        },
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// What the scripted gateway reports when asked to verify a session.
#[derive(Debug, Clone)]
pub enum VerifyMode {
    /// Report success with exactly the amount the session was opened for.
    Succeed,
    /// Report success but with this amount paid (minor units).
    PaidMinor(i64),
    /// Report a failed/declined payment.
    Declined,
    /// Simulate a provider outage.
    Unavailable,
}

/// Scripted in-process gateway: records sessions, answers verification per
/// the configured mode, and signs/verifies webhooks with the test secret.
pub struct ScriptedGateway {
    pub fail_session_init: AtomicBool,
    pub verify_mode: Mutex<VerifyMode>,
    pub verify_calls: AtomicUsize,
    session_amounts: Mutex<HashMap<String, i64>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            fail_session_init: AtomicBool::new(false),
            verify_mode: Mutex::new(VerifyMode::Succeed),
            verify_calls: AtomicUsize::new(0),
            session_amounts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_verify_mode(&self, mode: VerifyMode) {
        *self.verify_mode.lock().unwrap() = mode;
    }

    fn session_amount(&self, reference: &str) -> i64 {
        *self
            .session_amounts
            .lock()
            .unwrap()
            .get(reference)
            .unwrap_or(&0)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize_session(
        &self,
        request: InitializeSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        if self.fail_session_init.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayUnavailable(
                "scripted outage".to_string(),
            ));
        }

        let reference = format!("sess_{}", request.order_id.simple());
        self.session_amounts
            .lock()
            .unwrap()
            .insert(reference.clone(), to_minor_units(request.amount)?);

        Ok(GatewaySession {
            redirect_url: format!("https://gateway.test/pay/{}", reference),
            session_reference: reference,
        })
    }

    async fn verify(&self, session_reference: &str) -> Result<Verification, ServiceError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        let mode = self.verify_mode.lock().unwrap().clone();
        match mode {
            VerifyMode::Succeed => Ok(Verification {
                succeeded: true,
                amount_minor: self.session_amount(session_reference),
                authorization_token: Some(format!("AUTH-{}", session_reference)),
            }),
            VerifyMode::PaidMinor(amount_minor) => Ok(Verification {
                succeeded: true,
                amount_minor,
                authorization_token: Some(format!("AUTH-{}", session_reference)),
            }),
            VerifyMode::Declined => Ok(Verification {
                succeeded: false,
                amount_minor: self.session_amount(session_reference),
                authorization_token: None,
            }),
            VerifyMode::Unavailable => Err(ServiceError::GatewayUnavailable(
                "scripted outage".to_string(),
            )),
        }
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> bool {
        storefront_api::services::payments::verify_signature(
            WEBHOOK_SECRET,
            payload,
            signature_header,
            300,
            Utc::now(),
        )
    }
}

/// Test harness: in-memory SQLite (single-connection pool so every task
/// sees the same database), migrations, services and a scripted gateway.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub gateway: Arc<ScriptedGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
            WEBHOOK_SECRET.to_string(),
            "https://gateway.test".to_string(),
            "https://shop.test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(ScriptedGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            gateway.clone(),
            &cfg,
        );

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        });

        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a raw-body request with extra headers (webhook tests).
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn response_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        serde_json::from_slice(&bytes).expect("response body is not JSON")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        category: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        self.state
            .services
            .inventory
            .create_product(CreateProductInput {
                name: name.to_string(),
                category: category.to_string(),
                price,
                stock_quantity: stock,
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_customer(&self, name: &str, email: &str) -> customer::Model {
        let now = Utc::now();
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer")
    }

    pub async fn subscribe_newsletter(&self, email: &str) -> newsletter_subscription::Model {
        newsletter_subscription::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed newsletter subscription")
    }

    /// A general-audience coupon valid for the next 30 days; tweak the
    /// returned input before calling for other shapes.
    pub fn coupon_input(&self, code: &str) -> CreateCouponInput {
        CreateCouponInput {
            code: code.to_string(),
            discount_type: coupon::DiscountType::Fixed,
            value: Decimal::from(10),
            customer_type: coupon::CustomerType::General,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(30),
            usage_limit: None,
            per_user_limit: 1,
            minimum_order_amount: Decimal::ZERO,
            applicable_categories: None,
            excluded_categories: None,
        }
    }

    /// Inserts an order row directly, bypassing the pipeline. Used to shape
    /// order history for eligibility checks.
    pub async fn insert_order_with_status(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        payment_status: order::PaymentStatus,
    ) -> order::Model {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", order_id.to_string()[..8].to_uppercase())),
            customer_id: Set(Some(customer_id)),
            customer_email: Set("history@example.com".to_string()),
            status: Set(order::OrderStatus::Pending),
            order_date: Set(now),
            currency: Set("USD".to_string()),
            original_amount: Set(amount),
            total_amount: Set(amount),
            discount_amount: Set(Decimal::ZERO),
            coupon_code: Set(None),
            payment_method: Set("card".to_string()),
            payment_status: Set(payment_status),
            gateway_reference: Set(None),
            authorization_token: Set(None),
            shipping_address: Set("1 History Lane".to_string()),
            shipment_method: Set(order::ShipmentMethod::Standard),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order")
    }

    /// Standard checkout body for a single product line.
    pub fn checkout_body(
        &self,
        customer_id: Option<Uuid>,
        product: &product::Model,
        quantity: i32,
        coupon_code: Option<&str>,
    ) -> Value {
        let original = product.price * Decimal::from(quantity);
        serde_json::json!({
            "customer_id": customer_id,
            "customer_email": "shopper@example.com",
            "line_items": [{
                "product_id": product.id,
                "title": product.name,
                "unit_price": product.price,
                "size": null,
                "quantity": quantity,
            }],
            "shipping_address": "42 Checkout Way, Springfield",
            "shipment_method": "standard",
            "payment_method": "card",
            "currency": "USD",
            "original_amount": original,
            "coupon_code": coupon_code,
        })
    }

    pub async fn get_order(&self, order_id: Uuid) -> order::Model {
        self.state
            .services
            .orders
            .get_order(order_id)
            .await
            .expect("order exists")
            .order
    }

    pub async fn get_order_items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        self.state
            .services
            .orders
            .get_order(order_id)
            .await
            .expect("order exists")
            .items
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        self.state
            .services
            .inventory
            .get_product(product_id)
            .await
            .expect("product exists")
            .stock_quantity
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
