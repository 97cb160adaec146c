use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};

use crate::{
    errors::ApiError,
    handlers::{
        analytics::require_admin,
        common::{map_service_error, success_response},
        identity::CurrentUser,
    },
    AppState,
};

/// Creates the router for report endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_reports))
        .route("/:period/generate", post(generate_report))
}

/// Generate (or re-attempt) the report for one period.
/// A period that already reached SENT is returned unchanged.
async fn generate_report(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(period): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    require_admin(&state, &current).await?;

    let record = state
        .services
        .reports
        .generate(&period)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(record))
}

/// All report records, newest period first
async fn list_reports(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    require_admin(&state, &current).await?;

    let reports = state
        .services
        .reports
        .list_reports()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(reports))
}
