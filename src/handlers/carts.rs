use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ApiError,
    handlers::{
        common::{map_service_error, no_content_response, success_response, validate_input},
        identity::CurrentUser,
    },
    AppState,
};

/// Creates the router for cart endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/clear", post(clear_cart))
}

/// Get the caller's cart with items, creating it lazily
async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_with_items(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add a product to the caller's cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_item(user.id, payload.product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Update a cart line's quantity; zero or below removes the line
async fn update_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .map_err(map_service_error)?;

    state
        .services
        .cart
        .update_item_quantity(cart.id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_with_items(user.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove a cart line
async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .map_err(map_service_error)?;

    state
        .services
        .cart
        .remove_item(cart.id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Clear all lines from the caller's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_or_create_cart(user.id)
        .await
        .map_err(map_service_error)?;

    state
        .services
        .cart
        .clear_cart(cart.id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "message": "Cart cleared"
    })))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}
