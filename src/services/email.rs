use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Notification dispatch over an HTTP mail relay.
///
/// Delivery is fire-and-forget from the core's perspective: the order and
/// counter flows never block on, or fail because of, an email. When no relay
/// is configured the service logs and reports success.
#[derive(Clone)]
pub struct EmailService {
    client: reqwest::Client,
    relay_url: Option<String>,
    from: String,
}

impl EmailService {
    pub fn new(relay_url: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            relay_url,
            from,
        }
    }

    /// Relay-less service for environments without outbound mail.
    pub fn disabled() -> Self {
        Self::new(None, "orders@storefront.example".to_string())
    }

    /// Sends a templated message to a single recipient.
    #[instrument(skip(self, variables))]
    pub async fn send(
        &self,
        recipient: &str,
        template_key: &str,
        variables: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let Some(relay_url) = &self.relay_url else {
            debug!(
                "Mail relay not configured, skipping {} to {}",
                template_key, recipient
            );
            return Ok(());
        };

        let body = json!({
            "from": self.from,
            "to": recipient,
            "template": template_key,
            "variables": variables,
        });

        let response = self
            .client
            .post(relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("mail relay: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "mail relay returned {}",
                response.status()
            )));
        }

        info!("Sent {} email to {}", template_key, recipient);
        Ok(())
    }

    /// Order confirmation notification. Failures are logged, never surfaced.
    pub async fn send_order_confirmation(&self, recipient: &str, order_id: Uuid, total: &str) {
        let result = self
            .send(
                recipient,
                "order-confirmation",
                json!({
                    "orderNumber": order_reference(order_id),
                    "totalAmount": total,
                }),
            )
            .await;

        if let Err(e) = result {
            error!(
                "Failed to send order confirmation to {}: {}",
                recipient, e
            );
        }
    }

    /// Generic order status notification. Failures are logged, never surfaced.
    pub async fn send_order_status_update(&self, recipient: &str, order_id: Uuid, status: &str) {
        let result = self
            .send(
                recipient,
                "order-status-update",
                json!({
                    "orderNumber": order_reference(order_id),
                    "status": status,
                }),
            )
            .await;

        if let Err(e) = result {
            error!(
                "Failed to send order status update to {}: {}",
                recipient, e
            );
        }
    }

    /// Periodic analytics report fan-out. Unlike the order notifications the
    /// caller needs the outcome to record delivery state, so failures are
    /// returned. Individual recipient failures are logged and the first one
    /// is reported.
    pub async fn send_periodic_report(
        &self,
        recipients: &[String],
        period: &str,
        summary: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let mut first_error = None;

        for recipient in recipients {
            let result = self
                .send(
                    recipient,
                    "monthly-analytics-report",
                    json!({
                        "reportPeriod": period,
                        "summary": summary,
                    }),
                )
                .await;

            if let Err(e) = result {
                error!("Failed to send report for {} to {}: {}", period, recipient, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Customer-facing order reference, e.g. "ORD-550E8400".
pub fn order_reference(order_id: Uuid) -> String {
    format!("ORD-{}", order_id.to_string()[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_reference_is_short_and_uppercase() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(order_reference(id), "ORD-550E8400");
    }

    #[tokio::test]
    async fn disabled_service_reports_success() {
        let service = EmailService::disabled();
        let result = service
            .send("customer@example.com", "order-confirmation", json!({}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn disabled_service_report_fanout_succeeds() {
        let service = EmailService::disabled();
        let result = service
            .send_periodic_report(
                &["admin@example.com".to_string()],
                "2026-07",
                json!({"totalViews": 10}),
            )
            .await;
        assert!(result.is_ok());
    }
}
