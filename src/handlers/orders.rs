use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    entities::OrderModel,
    errors::ApiError,
    handlers::{
        common::{created_response, map_service_error, success_response},
        identity::{ensure_user, CurrentUser},
    },
    AppState, ListQuery,
};

/// Creates the router for order endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(order_history))
        .route("/confirm", get(confirm_return))
        .route("/cancelled", get(cancelled_return))
        .route("/:id", get(order_detail))
}

/// Create an order from the caller's cart and hand off to the payment gateway
async fn create_order(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let user = ensure_user(&state.db, &current)
        .await
        .map_err(map_service_error)?;

    let handoff = state
        .services
        .order
        .create_order(&user)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(handoff))
}

#[derive(Debug, Serialize)]
struct OrderListResponse {
    orders: Vec<OrderModel>,
    total: u64,
    page: u64,
    per_page: u64,
}

/// Paginated order history for the caller
async fn order_history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .order
        .list_orders_for_user(user.id, query.page, query.limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(OrderListResponse {
        orders,
        total,
        page: query.page,
        per_page: query.limit,
    }))
}

/// Single order with its lines; only visible to its owner
async fn order_detail(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_order_with_items(order_id)
        .await
        .map_err(map_service_error)?;

    if order.order.user_id != user.id {
        return Err(ApiError::NotFound(format!("Order {} not found", order_id)));
    }

    Ok(success_response(order))
}

#[derive(Debug, Deserialize)]
struct ConfirmQuery {
    session_id: String,
}

/// Gateway return redirect after a successful payment.
///
/// Carries the session id as a query parameter; the browser can replay it, so
/// it converges on the same idempotent confirmation as the verified
/// notification path.
async fn confirm_return(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfirmQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .confirm_order(&query.session_id)
        .await
        .map_err(|e| {
            error!("Redirect confirmation failed: {}", e);
            map_service_error(e)
        })?;

    info!("Redirect confirmation processed for order {}", order.id);
    Ok(success_response(order))
}

/// Gateway return redirect after an abandoned payment; the cart is preserved
async fn cancelled_return() -> impl axum::response::IntoResponse {
    success_response(serde_json::json!({
        "message": "Checkout was cancelled. Your cart has been preserved."
    }))
}
