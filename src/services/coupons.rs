use crate::{
    entities::{
        coupon::{self, CustomerType, DiscountType, Entity as Coupon},
        coupon_usage::{self, Entity as CouponUsage},
        customer::Entity as Customer,
        newsletter_subscription::{self, Entity as NewsletterSubscription},
        order::{self, Entity as Order, PaymentStatus},
    },
    errors::{CouponError, ServiceError},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QuerySelect, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Successful validation result: the coupon and the discount it yields for
/// the order amount it was validated against.
#[derive(Debug, Clone)]
pub struct CouponQuote {
    pub coupon: coupon::Model,
    pub discount_amount: Decimal,
}

/// A line item as seen by coupon category rules.
#[derive(Debug, Clone)]
pub struct CouponLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub customer_type: CustomerType,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: i32,
    pub minimum_order_amount: Decimal,
    pub applicable_categories: Option<Vec<String>>,
    pub excluded_categories: Option<Vec<String>>,
}

#[derive(FromQueryResult)]
struct SpendRow {
    customer_id: Option<Uuid>,
    total_amount: Decimal,
}

/// Coupon ledger: validates codes against eligibility, limits and category
/// rules, computes discounts, and records usage append-only.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a discount code for a shopper and order, returning the
    /// discount it would yield. Performs no writes; `commit_usage` records
    /// the spend from inside the order-creation transaction.
    #[instrument(skip(self, line_items), fields(shopper = %customer_id))]
    pub async fn validate(
        &self,
        code: &str,
        customer_id: Uuid,
        order_amount: Decimal,
        line_items: &[CouponLineItem],
    ) -> Result<CouponQuote, ServiceError> {
        let normalized = coupon::Model::normalize_code(code);
        let now = Utc::now();

        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?
            .ok_or(CouponError::NotFound)?;

        if !coupon.is_active {
            return Err(CouponError::Inactive.into());
        }
        if !coupon.is_within_window(now) {
            return Err(CouponError::Expired.into());
        }
        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                return Err(CouponError::UsageLimitReached.into());
            }
        }
        if order_amount < coupon.minimum_order_amount {
            return Err(CouponError::MinimumOrderAmount {
                minimum: coupon.minimum_order_amount,
                order_amount,
            }
            .into());
        }

        // Per-shopper limit counts the shopper's ledger entries.
        let prior_uses = CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .count(&*self.db)
            .await?;
        if prior_uses >= coupon.per_user_limit as u64 {
            return Err(CouponError::PerUserLimitReached.into());
        }

        self.check_categories(&coupon, line_items).await?;
        self.check_customer_type(&coupon, customer_id).await?;

        let discount_amount =
            calculate_discount(coupon.discount_type, coupon.value, order_amount);

        Ok(CouponQuote {
            coupon,
            discount_amount,
        })
    }

    async fn check_categories(
        &self,
        coupon: &coupon::Model,
        line_items: &[CouponLineItem],
    ) -> Result<(), ServiceError> {
        let applicable = coupon.applicable_category_list();
        let excluded = coupon.excluded_category_list();
        if applicable.is_empty() && excluded.is_empty() {
            return Ok(());
        }

        let product_ids: Vec<Uuid> = line_items.iter().map(|l| l.product_id).collect();
        let products = crate::entities::Product::find()
            .filter(crate::entities::product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?;
        let categories: Vec<&str> = products.iter().map(|p| p.category.as_str()).collect();

        if !excluded.is_empty() && categories.iter().any(|c| excluded.iter().any(|e| e == c)) {
            return Err(CouponError::CategoryExcluded.into());
        }
        if !applicable.is_empty() && !categories.iter().any(|c| applicable.iter().any(|a| a == c))
        {
            return Err(CouponError::CategoryNotApplicable.into());
        }

        Ok(())
    }

    async fn check_customer_type(
        &self,
        coupon: &coupon::Model,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        match coupon.customer_type {
            CustomerType::General => Ok(()),
            CustomerType::NewCustomer => {
                let successful_orders = Order::find()
                    .filter(order::Column::CustomerId.eq(customer_id))
                    .filter(order::Column::PaymentStatus.eq(PaymentStatus::Success))
                    .count(&*self.db)
                    .await?;
                if successful_orders == 0 {
                    Ok(())
                } else {
                    Err(CouponError::NotEligible {
                        required: "new_customer".to_string(),
                    }
                    .into())
                }
            }
            CustomerType::Subscriber => {
                let customer = Customer::find_by_id(customer_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Customer {} not found", customer_id))
                    })?;

                let subscribed = NewsletterSubscription::find()
                    .filter(newsletter_subscription::Column::Email.eq(customer.email))
                    .filter(newsletter_subscription::Column::IsActive.eq(true))
                    .count(&*self.db)
                    .await?
                    > 0;
                if subscribed {
                    Ok(())
                } else {
                    Err(CouponError::NotEligible {
                        required: "subscriber".to_string(),
                    }
                    .into())
                }
            }
            CustomerType::TopBuyer => {
                if self.current_top_buyer().await? == Some(customer_id) {
                    Ok(())
                } else {
                    Err(CouponError::NotEligible {
                        required: "top_buyer".to_string(),
                    }
                    .into())
                }
            }
        }
    }

    /// The single global leader by (successful order count, total spent),
    /// recomputed from the order history on every call so the status can
    /// never go stale. Full ties resolve on shopper id so exactly one
    /// shopper holds the status at any instant.
    pub async fn current_top_buyer(&self) -> Result<Option<Uuid>, ServiceError> {
        let rows = Order::find()
            .select_only()
            .column(order::Column::CustomerId)
            .column(order::Column::TotalAmount)
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Success))
            .filter(order::Column::CustomerId.is_not_null())
            .into_model::<SpendRow>()
            .all(&*self.db)
            .await?;

        let mut aggregates: HashMap<Uuid, (u64, Decimal)> = HashMap::new();
        for row in rows {
            if let Some(id) = row.customer_id {
                let entry = aggregates.entry(id).or_insert((0, Decimal::ZERO));
                entry.0 += 1;
                entry.1 += row.total_amount;
            }
        }

        Ok(aggregates
            .into_iter()
            .max_by(|(a_id, (a_count, a_total)), (b_id, (b_count, b_total))| {
                a_count
                    .cmp(b_count)
                    .then_with(|| a_total.cmp(b_total))
                    .then_with(|| a_id.cmp(b_id))
            })
            .map(|(id, _)| id))
    }

    /// Appends the usage-ledger entry and bumps the counter. Invoked from
    /// the order-creation transaction only: a coupon is spent at placement
    /// time, whatever later happens to the payment. The unique index on
    /// (coupon_id, order_id) backs the at-most-once-per-order rule.
    pub async fn commit_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon: &coupon::Model,
        customer_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    ) -> Result<(), ServiceError> {
        let usage = coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            customer_id: Set(customer_id),
            order_id: Set(order_id),
            discount_amount: Set(discount_amount),
            created_at: Set(Utc::now()),
        };
        usage.insert(conn).await?;

        let mut active: coupon::ActiveModel = coupon.clone().into();
        active.used_count = Set(coupon.used_count + 1);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        info!(coupon = %coupon.code, order_id = %order_id, "Coupon usage committed");
        Ok(())
    }

    /// Administrative creation (no HTTP surface; operator tooling and tests).
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        if input.value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Coupon value must be positive".to_string(),
            ));
        }
        if input.valid_until <= input.valid_from {
            return Err(ServiceError::ValidationError(
                "Coupon validity window is empty".to_string(),
            ));
        }
        if input.per_user_limit <= 0 {
            return Err(ServiceError::ValidationError(
                "Per-user limit must be at least 1".to_string(),
            ));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(coupon::Model::normalize_code(&input.code)),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            customer_type: Set(input.customer_type),
            valid_from: Set(input.valid_from),
            valid_until: Set(input.valid_until),
            usage_limit: Set(input.usage_limit),
            per_user_limit: Set(input.per_user_limit),
            minimum_order_amount: Set(input.minimum_order_amount),
            applicable_categories: Set(input
                .applicable_categories
                .map(|c| serde_json::json!(c))),
            excluded_categories: Set(input.excluded_categories.map(|c| serde_json::json!(c))),
            used_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }
}

/// Discount yielded by a coupon for a given order amount. The discount can
/// never exceed the order amount, whichever type computed it.
pub fn calculate_discount(
    discount_type: DiscountType,
    value: Decimal,
    order_amount: Decimal,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => order_amount * value / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => value,
    };
    raw.min(order_amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_discount_is_proportional() {
        assert_eq!(
            calculate_discount(DiscountType::Percentage, dec!(10), dec!(500)),
            dec!(50)
        );
    }

    #[test]
    fn percentage_discount_caps_at_order_amount() {
        // 150% of 500 would be 750; the discount is capped at 500.
        assert_eq!(
            calculate_discount(DiscountType::Percentage, dec!(150), dec!(500)),
            dec!(500)
        );
    }

    #[test]
    fn fixed_discount_caps_at_order_amount() {
        assert_eq!(
            calculate_discount(DiscountType::Fixed, dec!(20), dec!(100)),
            dec!(20)
        );
        assert_eq!(
            calculate_discount(DiscountType::Fixed, dec!(120), dec!(100)),
            dec!(100)
        );
    }

    #[test]
    fn code_normalization_is_case_insensitive() {
        assert_eq!(coupon::Model::normalize_code("  summer10 "), "SUMMER10");
        assert_eq!(
            coupon::Model::normalize_code("Summer10"),
            coupon::Model::normalize_code("SUMMER10")
        );
    }
}
