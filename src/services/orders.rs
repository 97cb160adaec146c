use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, UserModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::CartService,
        payments::{to_minor_units, PaymentGateway},
    },
};

/// Handle returned to the caller after order creation; the storefront
/// redirects the customer to `redirect_url` to pay.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutHandoff {
    pub order_id: Uuid,
    pub session_id: String,
    pub redirect_url: String,
}

/// Order with its frozen lines.
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Order lifecycle service.
///
/// Orders are created PENDING from a cart snapshot with prices frozen at
/// creation, handed off to the payment gateway, and confirmed later by
/// whichever reconciliation trigger arrives first.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    cart_service: Arc<CartService>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        cart_service: Arc<CartService>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            db,
            cart_service,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Creates an order from the user's cart and hands off to the payment
    /// gateway.
    ///
    /// The order and its lines are committed before the gateway call; the
    /// gateway call itself runs outside any transaction so no lock spans the
    /// external round-trip. A gateway failure leaves the PENDING order in
    /// place (the orphan reaper cancels it later) and the cart untouched.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create_order(&self, user: &UserModel) -> Result<CheckoutHandoff, ServiceError> {
        let cart = match self.cart_service.get_cart_with_items(user.id).await {
            Ok(cart) => cart,
            Err(ServiceError::NotFound(_)) => {
                return Err(ServiceError::ValidationError(
                    "Cannot create an order from an empty cart".to_string(),
                ))
            }
            Err(e) => return Err(e),
        };

        if cart.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot create an order from an empty cart".to_string(),
            ));
        }

        // Total from the catalog prices as of right now; the same prices are
        // frozen onto the lines below and never recomputed.
        let total: Decimal = cart
            .items
            .iter()
            .map(|line| line.product.price * Decimal::from(line.item.quantity))
            .sum();

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order_row = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            checkout_session_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        order_row.insert(&txn).await?;

        for line in &cart.items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product.id),
                quantity: Set(line.item.quantity),
                price: Set(line.product.price),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        info!("Created order {} for user {} (total {})", order_id, user.id, total);
        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        // External handoff, outside any transaction or lock scope.
        let amount_minor = to_minor_units(total)?;
        let session = self
            .gateway
            .create_session(order_id, amount_minor, &self.currency, &user.email)
            .await
            .map_err(|e| {
                warn!(
                    "Gateway session creation failed for order {}; order left pending: {}",
                    order_id, e
                );
                e
            })?;

        let mut pending: order::ActiveModel = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?
            .into();
        pending.checkout_session_id = Set(Some(session.session_id.clone()));
        pending.updated_at = Set(Utc::now());
        pending.update(&*self.db).await?;

        self.cart_service.clear_cart(cart.cart.id).await?;

        Ok(CheckoutHandoff {
            order_id,
            session_id: session.session_id,
            redirect_url: session.redirect_url,
        })
    }

    /// Moves an order to a new status.
    ///
    /// The transition table rejects anything not exercised by the order flow,
    /// and the write is conditional on the status that was read so racing
    /// writers cannot double-apply a transition. The winner dispatches the
    /// notification event; a same-status write is a silent no-op.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.get_order(order_id).await?;
        let old_status = order.status;

        if old_status == new_status {
            return Ok(order);
        }

        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::ValidationError(format!(
                "Cannot transition order from {} to {}",
                old_status, new_status
            )));
        }

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(old_status))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // A racing writer changed the row first. If it already reached
            // the requested status the outcome is the same and nothing more
            // must happen here; anything else is a real conflict.
            let current = self.get_order(order_id).await?;
            if current.status == new_status {
                return Ok(current);
            }
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        info!(
            "Order {} status updated from {} to {}",
            order_id, old_status, new_status
        );

        match new_status {
            OrderStatus::Confirmed => {
                self.event_sender
                    .send_or_log(Event::OrderConfirmed(order_id))
                    .await;
            }
            OrderStatus::Pending => {}
            _ => {
                self.event_sender
                    .send_or_log(Event::OrderStatusChanged {
                        order_id,
                        old_status,
                        new_status,
                    })
                    .await;
            }
        }

        self.get_order(order_id).await
    }

    /// Confirms the order correlated with a checkout session.
    ///
    /// Single entry point for both reconciliation triggers (redirect return
    /// and gateway notification); safe to call any number of times for the
    /// same session. The confirmation is applied, and its side effects
    /// dispatched, at most once.
    #[instrument(skip(self))]
    pub async fn confirm_order(&self, session_id: &str) -> Result<OrderModel, ServiceError> {
        let order = Order::find()
            .filter(order::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order for session {} not found", session_id))
            })?;

        if order.status != OrderStatus::Pending {
            // Already reconciled (or cancelled underneath the payment);
            // repeating the trigger must not re-apply anything.
            return Ok(order);
        }

        self.update_status(order.id, OrderStatus::Confirmed).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = self.get_order(order_id).await?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// Paginated order history for one user, newest first.
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    pub async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::Status.eq(status))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Cancels PENDING orders that never obtained a checkout session and are
    /// older than `max_age`, the residue of gateway failures during creation.
    #[instrument(skip(self))]
    pub async fn reap_orphaned_orders(&self, max_age: Duration) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - max_age;

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CheckoutSessionId.is_null())
            .filter(order::Column::CreatedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            info!("Cancelled {} orphaned pending orders", result.rows_affected);
        }

        Ok(result.rows_affected)
    }
}

/// Periodically cancels session-less PENDING orders left behind by failed
/// gateway handoffs.
pub async fn run_orphan_reaper(service: Arc<OrderService>, max_age_secs: u64) {
    let period = std::time::Duration::from_secs(max_age_secs.max(60) / 2);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = service
            .reap_orphaned_orders(Duration::seconds(max_age_secs as i64))
            .await
        {
            error!("Orphan reaper pass failed: {}", e);
        }
    }
}
