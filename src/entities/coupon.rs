use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campaign-scoped discount definition. `code` is stored normalized
/// (trimmed, uppercased) and unique. Whether a coupon is currently usable is
/// derived from the validity window and the usage ledger at validation time,
/// never cached; `is_active` is only the administrative kill switch.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    pub customer_type: CustomerType,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub minimum_order_amount: Decimal,
    #[sea_orm(column_type = "Json", nullable)]
    pub applicable_categories: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub excluded_categories: Option<Json>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    Usages,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Normalized form under which codes are stored and looked up.
    pub fn normalize_code(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now <= self.valid_until
    }

    fn category_list(raw: &Option<Json>) -> Vec<String> {
        raw.as_ref()
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn applicable_category_list(&self) -> Vec<String> {
        Self::category_list(&self.applicable_categories)
    }

    pub fn excluded_category_list(&self) -> Vec<String> {
        Self::category_list(&self.excluded_categories)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Shopper classification a coupon may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    #[sea_orm(string_value = "top_buyer")]
    TopBuyer,
    #[sea_orm(string_value = "subscriber")]
    Subscriber,
    #[sea_orm(string_value = "new_customer")]
    NewCustomer,
    #[sea_orm(string_value = "general")]
    General,
}
