use crate::{
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        product::Entity as Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service: one live cart per shopper, created on first
/// add-to-cart, destroyed by the confirmation winner of the order placed
/// from it.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

#[derive(Debug, Clone)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub size: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the shopper's live cart, creating it if this is their first
    /// add-to-cart.
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }

    /// Adds an item to the shopper's cart, merging with an existing line
    /// when the same product+size pair is already present.
    #[instrument(skip(self, input), fields(customer_id = %customer_id, product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let product = Product::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available",
                product.id
            )));
        }

        let cart = self.get_or_create_cart(customer_id).await?;
        let now = Utc::now();

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(match &input.size {
                Some(size) => cart_item::Column::Size.eq(size.clone()),
                None => cart_item::Column::Size.is_null(),
            })
            .one(&*self.db)
            .await?;

        match existing {
            Some(item) => {
                let merged = item.quantity + input.quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(merged);
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    size: Set(input.size),
                    quantity: Set(input.quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                item.insert(&*self.db).await?;
            }
        }

        let mut cart_active: cart::ActiveModel = cart.into();
        cart_active.updated_at = Set(now);
        let cart = cart_active.update(&*self.db).await?;

        self.cart_with_items(cart).await
    }

    /// Replaces a line's quantity; zero removes the line.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let cart = self.require_cart(customer_id).await?;
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .filter(|i| i.cart_id == cart.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity == 0 {
            item.delete(&*self.db).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        self.cart_with_items(cart).await
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        self.update_item_quantity(customer_id, item_id, 0).await
    }

    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.require_cart(customer_id).await?;
        self.cart_with_items(cart).await
    }

    /// Tears down the shopper's cart and its lines. Deleting an
    /// already-absent cart is a no-op so the confirmation path can call this
    /// unconditionally.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn delete_cart(&self, customer_id: Uuid) -> Result<bool, ServiceError> {
        let cart = match Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
        {
            Some(cart) => cart,
            None => return Ok(false),
        };

        let cart_id = cart.id;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&*self.db)
            .await?;
        cart.delete(&*self.db).await?;

        info!(cart_id = %cart_id, "Cart deleted");
        self.event_sender.send_or_log(Event::CartDeleted(cart_id)).await;

        Ok(true)
    }

    async fn require_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No cart for customer {}", customer_id))
            })
    }

    async fn cart_with_items(&self, cart: cart::Model) -> Result<CartWithItems, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;
        Ok(CartWithItems { cart, items })
    }
}
