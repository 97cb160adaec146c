pub mod analytics;
pub mod carts;
pub mod catalog;
pub mod email;
pub mod orders;
pub mod payments;
pub mod reports;

pub use analytics::{AnalyticsService, AnalyticsSort, ViewTracker};
pub use carts::CartService;
pub use catalog::CatalogService;
pub use email::EmailService;
pub use orders::OrderService;
pub use payments::PaymentGateway;
pub use reports::ReportService;
