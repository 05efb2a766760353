use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    entities::{cart, cart_item},
    errors::ApiError,
    services::carts::{AddItemInput, CartWithItems},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints. The session layer is an external
/// collaborator, so the owner id rides in the path.
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:customer_id", get(get_cart))
        .route("/:customer_id/items", post(add_item))
        .route("/:customer_id/items/:item_id", put(update_item))
        .route("/:customer_id/items/:item_id", delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/api/v1/carts/{customer_id}",
    params(("customer_id" = Uuid, Path, description = "Cart owner")),
    responses(
        (status = 200, description = "The shopper's live cart", body = CartResponse),
        (status = 404, description = "No live cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .get_cart(customer_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Add a product to the cart, creating the cart on first use. Repeat
/// additions of the same product+size pair merge quantities.
#[utoipa::path(
    post,
    path = "/api/v1/carts/{customer_id}/items",
    params(("customer_id" = Uuid, Path, description = "Cart owner")),
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id: payload.product_id,
                size: payload.size,
                quantity: payload.quantity,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

#[utoipa::path(
    put,
    path = "/api/v1/carts/{customer_id}/items/{item_id}",
    params(
        ("customer_id" = Uuid, Path, description = "Cart owner"),
        ("item_id" = Uuid, Path, description = "Cart line id")
    ),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Unknown cart or line", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(customer_id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/carts/{customer_id}/items/{item_id}",
    params(
        ("customer_id" = Uuid, Path, description = "Cart owner"),
        ("item_id" = Uuid, Path, description = "Cart line id")
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Unknown cart or line", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .remove_item(customer_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub size: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<CartLineResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: Option<String>,
    pub quantity: i32,
}

impl From<CartWithItems> for CartResponse {
    fn from(value: CartWithItems) -> Self {
        let cart: cart::Model = value.cart;
        Self {
            id: cart.id,
            customer_id: cart.customer_id,
            items: value.items.into_iter().map(CartLineResponse::from).collect(),
        }
    }
}

impl From<cart_item::Model> for CartLineResponse {
    fn from(item: cart_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            size: item.size,
            quantity: item.quantity,
        }
    }
}
