pub mod analytics_counter;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod report_record;
pub mod user;

// Re-export entities
pub use analytics_counter::{Entity as AnalyticsCounter, Model as AnalyticsCounterModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use report_record::{Entity as ReportRecord, Model as ReportRecordModel, ReportStatus};
pub use user::{Entity as User, Model as UserModel};
