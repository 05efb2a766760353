use crate::{
    config::NotificationConfig,
    entities::product::{self, Entity as Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// One line of a reservation commit.
#[derive(Debug, Clone)]
pub struct ReservationLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Service owning the stock counts consumed by the order pipeline.
///
/// `commit_reservation` is the only stock mutation the pipeline performs:
/// a whole-order decrement that either applies every line or none of them.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifications: NotificationConfig,
}

impl InventoryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifications: NotificationConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifications,
        }
    }

    /// Decrements stock for every line of an order, exactly once.
    ///
    /// Runs in a single transaction. Each line is one conditional update:
    /// the quantity check and the decrement happen in the same statement,
    /// so two orders racing over the last unit cannot both win. Any line
    /// with insufficient stock aborts and rolls back the lines already
    /// decremented in this call.
    ///
    /// The caller (the order lifecycle) guarantees this is invoked at most
    /// once per order; the claim on the order row is what enforces that.
    #[instrument(skip(self, lines), fields(order_id = %order_id, line_count = lines.len()))]
    pub async fn commit_reservation(
        &self,
        order_id: Uuid,
        lines: &[ReservationLine],
    ) -> Result<(), ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot commit a reservation with no lines".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        for line in lines {
            if line.quantity <= 0 {
                txn.rollback().await?;
                return Err(ServiceError::InvalidOperation(format!(
                    "Invalid quantity {} for product {}",
                    line.quantity, line.product_id
                )));
            }

            let result = Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(line.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(line.product_id))
                .filter(product::Column::StockQuantity.gte(line.quantity))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                let existing = Product::find_by_id(line.product_id).one(&txn).await?;
                txn.rollback().await?;

                return match existing {
                    None => Err(ServiceError::NotFound(format!(
                        "Product {} not found",
                        line.product_id
                    ))),
                    Some(p) => Err(ServiceError::InsufficientStock(format!(
                        "Product {} has {} in stock, {} requested",
                        line.product_id, p.stock_quantity, line.quantity
                    ))),
                };
            }
        }

        txn.commit().await?;

        info!(order_id = %order_id, "Inventory committed");
        self.emit_low_stock_alerts(lines).await;

        Ok(())
    }

    async fn emit_low_stock_alerts(&self, lines: &[ReservationLine]) {
        if !self.notifications.low_stock_alerts {
            return;
        }

        for line in lines {
            match Product::find_by_id(line.product_id).one(&*self.db).await {
                Ok(Some(p)) if p.stock_quantity <= self.notifications.low_stock_threshold => {
                    self.event_sender
                        .send_or_log(Event::LowStock {
                            product_id: p.id,
                            remaining: p.stock_quantity,
                        })
                        .await;
                }
                Ok(_) => {}
                Err(e) => error!(product_id = %line.product_id, error = %e, "Low-stock check failed"),
            }
        }
    }

    /// Creates a product row (operator/seeding surface; the catalog proper
    /// is an external collaborator).
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            category: Set(input.category),
            price: Set(input.price),
            stock_quantity: Set(input.stock_quantity),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Sets the absolute stock count for a product.
    #[instrument(skip(self))]
    pub async fn set_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let product = self.get_product(product_id).await?;

        let mut active: product::ActiveModel = product.into();
        active.stock_quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub stock_quantity: i32,
}
