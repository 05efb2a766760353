use crate::{
    entities::{
        order::{self, Entity as Order, OrderStatus, PaymentStatus, ShipmentMethod},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::CartService,
        coupons::{CouponLineItem, CouponQuote, CouponService},
        inventory::{InventoryService, ReservationLine},
        payments::{to_minor_units, InitializeSessionRequest, PaymentGateway},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Snapshot line item supplied at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Line item title is required"))]
    pub title: String,
    pub unit_price: Decimal,
    pub size: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(email(message = "A valid contact email is required"))]
    pub customer_email: String,
    #[validate]
    pub line_items: Vec<OrderLineInput>,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
    pub shipment_method: ShipmentMethod,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    /// Pre-discount amount as computed by the storefront; must equal the sum
    /// of the snapshot lines.
    pub original_amount: Decimal,
    pub coupon_code: Option<String>,
}

/// Response to a successful checkout: where to send the shopper next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub redirect_url: String,
    pub session_reference: String,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
}

/// Result of a confirmation attempt, whichever path delivered it. Repeat
/// confirmations of a settled order surface the terminal state with
/// `newly_confirmed = false` and perform no further side effects.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationOutcome {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub newly_confirmed: bool,
    /// Set when payment was captured but the stock commit failed; the order
    /// stays confirmed and reconciliation is an operator concern.
    pub inventory_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Order lifecycle state machine. Owns the order's status and billing
/// sub-record; the confirmation claim here is what makes the two racing
/// confirmation paths (browser return and provider webhook) decrement
/// inventory and destroy the cart exactly once.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    coupons: Arc<CouponService>,
    inventory: Arc<InventoryService>,
    carts: Arc<CartService>,
    gateway: Arc<dyn PaymentGateway>,
    callback_base_url: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        coupons: Arc<CouponService>,
        inventory: Arc<InventoryService>,
        carts: Arc<CartService>,
        gateway: Arc<dyn PaymentGateway>,
        callback_base_url: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
            inventory,
            carts,
            gateway,
            callback_base_url,
        }
    }

    /// Checkout: persists a pending order (spending the coupon, if any, in
    /// the same transaction) and opens a gateway session. Gateway failure
    /// marks the order failed and leaves the shopper's cart intact so
    /// checkout can be retried.
    #[instrument(skip(self, request), fields(customer_email = %request.customer_email))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if request.line_items.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one line item".to_string(),
            ));
        }

        let mut computed_total = Decimal::ZERO;
        for line in &request.line_items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for {} must be positive",
                    line.title
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Unit price for {} cannot be negative",
                    line.title
                )));
            }
            computed_total += line.unit_price * Decimal::from(line.quantity);
        }
        if computed_total != request.original_amount {
            return Err(ServiceError::ValidationError(format!(
                "Declared amount {} does not match line total {}",
                request.original_amount, computed_total
            )));
        }

        // Coupons are spent at placement time, not at payment success; see
        // the ledger invariants. A guest order cannot carry one, because
        // per-shopper limits and eligibility need an owner.
        let quote: Option<CouponQuote> = match &request.coupon_code {
            Some(code) => {
                let customer_id = request.customer_id.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "A coupon code requires a signed-in shopper".to_string(),
                    )
                })?;
                let coupon_lines: Vec<CouponLineItem> = request
                    .line_items
                    .iter()
                    .map(|l| CouponLineItem {
                        product_id: l.product_id,
                        quantity: l.quantity,
                    })
                    .collect();
                Some(
                    self.coupons
                        .validate(code, customer_id, request.original_amount, &coupon_lines)
                        .await?,
                )
            }
            None => None,
        };

        let discount_amount = quote
            .as_ref()
            .map(|q| q.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total_amount = request.original_amount - discount_amount;

        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", order_id.to_string()[..8].to_uppercase());
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(request.customer_id),
            customer_email: Set(request.customer_email.clone()),
            status: Set(OrderStatus::Pending),
            order_date: Set(now),
            currency: Set(request.currency.clone()),
            original_amount: Set(request.original_amount),
            total_amount: Set(total_amount),
            discount_amount: Set(discount_amount),
            coupon_code: Set(quote.as_ref().map(|q| q.coupon.code.clone())),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(PaymentStatus::Pending),
            gateway_reference: Set(None),
            authorization_token: Set(None),
            shipping_address: Set(request.shipping_address.clone()),
            shipment_method: Set(request.shipment_method),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        order_model.insert(&txn).await?;

        for line in &request.line_items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                title: Set(line.title.clone()),
                size: Set(line.size.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.unit_price * Decimal::from(line.quantity)),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        if let Some(q) = &quote {
            let customer_id = request.customer_id.expect("validated above");
            self.coupons
                .commit_usage(&txn, &q.coupon, customer_id, order_id, q.discount_amount)
                .await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order_number, "Order created");
        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        if let Some(q) = &quote {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    coupon_id: q.coupon.id,
                    order_id,
                    discount_amount: q.discount_amount,
                })
                .await;
        }

        let session = match self
            .gateway
            .initialize_session(InitializeSessionRequest {
                order_id,
                amount: total_amount,
                currency: request.currency.clone(),
                customer_email: request.customer_email.clone(),
                callback_url: format!("{}/orders/confirm", self.callback_base_url),
            })
            .await
        {
            Ok(session) => session,
            Err(e) => {
                // No automatic retry: the shopper restarts checkout, with
                // their cart untouched.
                warn!(order_id = %order_id, error = %e, "Gateway session init failed");
                self.settle_failed(order_id, PaymentStatus::Pending).await?;
                return Err(e);
            }
        };

        let mut active: order::ActiveModel = Default::default();
        active.id = Set(order_id);
        active.gateway_reference = Set(Some(session.session_reference.clone()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;

        Ok(CheckoutResponse {
            order_id,
            order_number,
            redirect_url: session.redirect_url,
            session_reference: session.session_reference,
            total_amount,
            discount_amount,
        })
    }

    /// Confirms an order's payment. Invoked independently by the browser
    /// return handler and the provider webhook, in any order, any number of
    /// times.
    ///
    /// The single atomic claim (`pending -> success` conditioned on
    /// `pending`) arbitrates the race: the winner alone verifies with the
    /// gateway, commits inventory, tears down the cart and persists the
    /// final state. Losers observe the terminal state as an idempotent
    /// no-op. A gateway outage mid-verification reverts the claim so the
    /// provider's retry can finish the job; nothing is ever reverted once
    /// inventory has been committed.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        session_reference: Option<&str>,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let stored_reference = order.gateway_reference.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("Order has no gateway session".to_string())
        })?;
        if let Some(supplied) = session_reference {
            if supplied != stored_reference {
                return Err(ServiceError::ValidationError(
                    "Session reference does not match order".to_string(),
                ));
            }
        }

        if !self.claim_transition(order_id, PaymentStatus::Pending, PaymentStatus::Success).await? {
            // Lost the race (or the order was already settled): surface the
            // existing terminal state without repeating any side effect.
            let current = self.require_order(order_id).await?;
            return Ok(ConfirmationOutcome {
                order_id,
                payment_status: current.payment_status,
                order_status: current.status,
                newly_confirmed: false,
                inventory_error: None,
            });
        }

        // We own the claim. No lock is held while the gateway is consulted.
        let verification = match self.gateway.verify(&stored_reference).await {
            Ok(v) => v,
            Err(e) if e.is_transient() => {
                // Hand the claim back so the provider's webhook retry (or
                // the shopper's return call) can complete later.
                self.claim_transition(order_id, PaymentStatus::Success, PaymentStatus::Pending)
                    .await?;
                return Err(e);
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Gateway refused verification");
                return self.settle_failed(order_id, PaymentStatus::Success).await;
            }
        };

        let expected_minor = to_minor_units(order.total_amount)?;
        if !verification.succeeded || verification.amount_minor != expected_minor {
            warn!(
                order_id = %order_id,
                expected_minor,
                paid_minor = verification.amount_minor,
                succeeded = verification.succeeded,
                "Payment verification failed"
            );
            return self.settle_failed(order_id, PaymentStatus::Success).await;
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let lines: Vec<ReservationLine> = items
            .iter()
            .map(|i| ReservationLine {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();

        let inventory_error = match self.inventory.commit_reservation(order_id, &lines).await {
            Ok(()) => None,
            Err(e) if e.is_transient() => {
                // Nothing was decremented; the retry re-runs the whole
                // winner path from the claim.
                self.claim_transition(order_id, PaymentStatus::Success, PaymentStatus::Pending)
                    .await?;
                return Err(e);
            }
            Err(e) => {
                // Payment is already captured by the gateway; this is an
                // operational alert, not a reversal. Reconciliation or a
                // manual refund is an administrative follow-up.
                error!(order_id = %order_id, error = %e, "Stock commit failed after captured payment");
                Some(e.to_string())
            }
        };

        if let Some(customer_id) = order.customer_id {
            if let Err(e) = self.carts.delete_cart(customer_id).await {
                // Past the point of no return: payment captured, inventory
                // committed. A surviving cart is an operator cleanup, not a
                // reason to fail the confirmation.
                error!(order_id = %order_id, error = %e, "Cart teardown failed");
            }
        }

        let mut active: order::ActiveModel = Default::default();
        active.id = Set(order_id);
        active.authorization_token = Set(verification.authorization_token.clone());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(order.version + 1);
        active.update(&*self.db).await?;

        info!(order_id = %order_id, "Payment confirmed");
        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                order_id,
                amount: order.total_amount,
            })
            .await;

        Ok(ConfirmationOutcome {
            order_id,
            payment_status: PaymentStatus::Success,
            order_status: order.status,
            newly_confirmed: true,
            inventory_error,
        })
    }

    /// Administrative fulfillment progression. Never touches the billing
    /// payment status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.require_order(order_id).await?;

        if !allowed_status_transition(order.status, new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {:?} to {:?}",
                order.status, new_status
            )));
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status),
                new_status: format!("{:?}", new_status),
            })
            .await;

        Ok(updated)
    }

    /// Resolves the order a provider webhook refers to.
    pub async fn find_by_gateway_reference(
        &self,
        reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::GatewayReference.eq(reference))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = self.require_order(order_id).await?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderDetails { order, items })
    }

    /// Single-statement conditional transition of the billing payment
    /// status: succeeds for exactly one caller when racing. This is the
    /// claim the whole pipeline's exactly-once guarantee rests on.
    async fn claim_transition(
        &self,
        order_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(from))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Settles the order as failed (payment and fulfillment both) from the
    /// given claimed state. Inventory and cart are never touched here.
    async fn settle_failed(
        &self,
        order_id: Uuid,
        from: PaymentStatus,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        self.claim_transition(order_id, from, PaymentStatus::Failed)
            .await?;

        Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Failed))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Failed))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::PaymentFailed(order_id)).await;

        Ok(ConfirmationOutcome {
            order_id,
            payment_status: PaymentStatus::Failed,
            order_status: OrderStatus::Failed,
            newly_confirmed: true,
            inventory_error: None,
        })
    }

    async fn require_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}

/// Fulfillment progression rules: forward through
/// pending -> processing -> shipped -> delivered, with cancelled/rejected
/// available until the order ships. Failed is terminal.
fn allowed_status_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Cancelled)
            | (Pending, Rejected)
            | (Processing, Shipped)
            | (Processing, Cancelled)
            | (Processing, Rejected)
            | (Shipped, Delivered)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_fulfillment_order() {
        use OrderStatus::*;
        assert!(allowed_status_transition(Pending, Processing));
        assert!(allowed_status_transition(Processing, Shipped));
        assert!(allowed_status_transition(Shipped, Delivered));
        assert!(allowed_status_transition(Pending, Cancelled));
        assert!(allowed_status_transition(Processing, Rejected));

        assert!(!allowed_status_transition(Pending, Shipped));
        assert!(!allowed_status_transition(Shipped, Cancelled));
        assert!(!allowed_status_transition(Delivered, Pending));
        assert!(!allowed_status_transition(Failed, Processing));
    }
}
