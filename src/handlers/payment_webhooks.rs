use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use metrics::counter;
use tracing::{error, info};

use crate::{errors::ServiceError, AppState};

/// Signature header attached by the payment processor to every notification.
const SIGNATURE_HEADER: &str = "x-gateway-signature";

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification processed or intentionally ignored"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // Authenticity first; nothing in the payload is trusted until the
    // signature over the raw bytes checks out.
    let event = state.services.gateway.verify_and_parse(&body, signature)?;
    counter!("storefront_webhooks.verified", 1);

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session_id = event.session_id()?;
            match state.services.order.confirm_order(session_id).await {
                Ok(order) => {
                    info!(
                        "Payment notification reconciled order {} (session {}, status {})",
                        order.id, session_id, order.status
                    );
                }
                Err(e) => {
                    // Acknowledge anyway: the processor channel retries on
                    // its own schedule and a missing order is an operational
                    // follow-up, not a client error.
                    error!(
                        "Failed to reconcile payment notification for session {}: {}",
                        session_id, e
                    );
                }
            }
        }
        other => {
            info!("Ignoring payment webhook event type: {}", other);
        }
    }

    Ok((StatusCode::OK, "ok"))
}
