pub mod analytics;
pub mod carts;
pub mod common;
pub mod identity;
pub mod orders;
pub mod payment_webhooks;
pub mod products;
pub mod reports;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        AnalyticsService, CartService, CatalogService, EmailService, OrderService, PaymentGateway,
        ReportService, ViewTracker,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub order: Arc<OrderService>,
    pub analytics: Arc<AnalyticsService>,
    pub view_tracker: Arc<ViewTracker>,
    pub reports: Arc<ReportService>,
    pub email: Arc<EmailService>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppServices {
    /// Wires the service graph used by the HTTP layer.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        email: Arc<EmailService>,
        config: &AppConfig,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let analytics = Arc::new(AnalyticsService::new(
            db.clone(),
            config.counter_max_retries,
        ));
        let order = Arc::new(OrderService::new(
            db.clone(),
            cart.clone(),
            gateway.clone(),
            event_sender.clone(),
            config.currency.clone(),
        ));
        let reports = Arc::new(ReportService::new(
            db,
            analytics.clone(),
            email.clone(),
            event_sender,
        ));

        Self {
            catalog,
            cart,
            order,
            analytics,
            view_tracker: Arc::new(ViewTracker::new()),
            reports,
            email,
            gateway,
        }
    }
}
