use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    entities::ProductModel,
    errors::ApiError,
    handlers::common::{map_service_error, success_response},
    AppState, ListQuery,
};

/// Creates the router for catalog endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(product_detail))
}

#[derive(Debug, Serialize)]
struct ProductListResponse {
    products: Vec<ProductModel>,
    total: u64,
    page: u64,
    per_page: u64,
}

/// Available products, paginated
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (products, total) = state
        .services
        .catalog
        .list_available(query.page, query.limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductListResponse {
        products,
        total,
        page: query.page,
        per_page: query.limit,
    }))
}

/// Product detail.
///
/// Tracks a view when the request carries a browsing session, counting at
/// most one view per product per session. Tracking is best-effort: a counter
/// failure is logged and the product is still returned.
async fn product_detail(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(product_id)
        .await
        .map_err(map_service_error)?;

    if let Some(session_id) = headers.get("x-session-id").and_then(|v| v.to_str().ok()) {
        track_view_if_new(&state, session_id, product_id).await;
    }

    Ok(success_response(product))
}

async fn track_view_if_new(state: &AppState, session_id: &str, product_id: Uuid) {
    let tracker = &state.services.view_tracker;
    if tracker.already_viewed(session_id, product_id) {
        return;
    }

    match state.services.analytics.increment_view(product_id).await {
        Ok(()) => tracker.mark_viewed(session_id, product_id),
        Err(e) => {
            // The page render must not fail because of the counter.
            warn!("View tracking failed for product {}: {}", product_id, e);
        }
    }
}
