use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{order_item, OrderItem, OrderStatus, User},
    errors::ServiceError,
    services::{analytics::AnalyticsService, email::EmailService},
};

/// Events emitted by the core after their primary write has committed.
///
/// Side effects (emails, counter bumps) hang off these events on a background
/// worker; a failing side effect never reaches back into the operation that
/// produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),
    OrderCreated(Uuid),
    OrderConfirmed(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    ReportSent { period: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging on failure instead of surfacing it
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Background worker that turns committed events into their side effects.
pub struct EventProcessor {
    db: Arc<DbPool>,
    analytics: Arc<AnalyticsService>,
    email: Arc<EmailService>,
}

impl EventProcessor {
    pub fn new(db: Arc<DbPool>, analytics: Arc<AnalyticsService>, email: Arc<EmailService>) -> Self {
        Self {
            db,
            analytics,
            email,
        }
    }

    /// Drains the event channel until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Event>) {
        info!("Starting event processing loop");

        while let Some(event) = rx.recv().await {
            match event {
                Event::OrderConfirmed(order_id) => {
                    if let Err(e) = self.handle_order_confirmed(order_id).await {
                        error!(
                            "Failed to handle order confirmed event: order_id={}, error={}",
                            order_id, e
                        );
                    }
                }
                Event::OrderStatusChanged {
                    order_id,
                    new_status,
                    ..
                } => {
                    if let Err(e) = self.handle_status_changed(order_id, new_status).await {
                        error!(
                            "Failed to handle status change event: order_id={}, error={}",
                            order_id, e
                        );
                    }
                }
                other => {
                    info!("Received event: {:?}", other);
                }
            }
        }

        info!("Event channel closed, stopping event processing loop");
    }

    /// Confirmation side effects: one confirmation email and one order-count
    /// increment per line. Reached exactly once per order because only the
    /// winning status write emits the event.
    async fn handle_order_confirmed(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order, user) = self.load_order_with_user(order_id).await?;

        self.email
            .send_order_confirmation(&user.email, order.id, &order.total_amount.to_string())
            .await;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        for item in items {
            if let Err(e) = self
                .analytics
                .increment_order(item.product_id, item.quantity)
                .await
            {
                error!(
                    "Failed to increment order count: product_id={}, error={}",
                    item.product_id, e
                );
            }
        }

        Ok(())
    }

    async fn handle_status_changed(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let (order, user) = self.load_order_with_user(order_id).await?;

        self.email
            .send_order_status_update(&user.email, order.id, &new_status.to_string())
            .await;

        Ok(())
    }

    async fn load_order_with_user(
        &self,
        order_id: Uuid,
    ) -> Result<(crate::entities::OrderModel, crate::entities::UserModel), ServiceError> {
        let order = crate::entities::Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let user = order
            .find_related(User)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("User {} not found", order.user_id))
            })?;

        Ok((order, user))
    }
}
