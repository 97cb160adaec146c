use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::{
    errors::ApiError,
    handlers::{
        common::{map_service_error, success_response},
        identity::{ensure_user, CurrentUser},
    },
    services::AnalyticsSort,
    AppState,
};

/// Creates the router for the admin analytics endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_analytics))
        .route("/summary", get(analytics_summary))
}

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    sort: Option<String>,
}

/// Every product with its view/order counts, in the requested order.
/// Untracked products appear with zero counts.
async fn list_analytics(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    require_admin(&state, &current).await?;

    let sort = AnalyticsSort::parse(query.sort.as_deref());
    let listing = state
        .services
        .analytics
        .list_product_analytics(sort)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(listing))
}

/// Catalog-wide view and order totals
async fn analytics_summary(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    require_admin(&state, &current).await?;

    let summary = state
        .services
        .analytics
        .summary()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(summary))
}

pub(crate) async fn require_admin(
    state: &AppState,
    current: &CurrentUser,
) -> Result<(), ApiError> {
    let user = ensure_user(&state.db, current)
        .await
        .map_err(map_service_error)?;

    if !user.is_admin {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
