use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the pipeline. The background consumer is the
/// seam for the transactional-email collaborator: low-stock and order
/// alerts are delegated there, gated by the notification toggles in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        amount: Decimal,
    },
    PaymentFailed(Uuid),
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    },
    CartDeleted(Uuid),
    LowStock {
        product_id: Uuid,
        remaining: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// Event delivery is best-effort and never blocks a state transition.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Event dropped");
        }
    }
}

/// Background consumer. Logs every event; notification-worthy ones are
/// handed to the email collaborator from here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStock {
                product_id,
                remaining,
            } => {
                warn!(product_id = %product_id, remaining = %remaining, "Low stock");
            }
            Event::PaymentConfirmed { order_id, amount } => {
                info!(order_id = %order_id, amount = %amount, "Payment confirmed");
            }
            other => {
                info!(event = ?other, "Event processed");
            }
        }
    }
}
