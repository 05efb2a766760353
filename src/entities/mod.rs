pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod coupon_usage;
pub mod customer;
pub mod newsletter_subscription;
pub mod order;
pub mod order_item;
pub mod product;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use customer::{Entity as Customer, Model as CustomerModel};
pub use newsletter_subscription::{
    Entity as NewsletterSubscription, Model as NewsletterSubscriptionModel,
};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
