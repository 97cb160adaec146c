use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{analytics_counter, AnalyticsCounter, Product},
    errors::ServiceError,
};

/// Per-product usage counters under optimistic concurrency.
///
/// Increments are read-modify-write cycles: the write is conditional on the
/// version that was read, and a failed condition retries the whole cycle up
/// to the configured budget. No lock is held across the cycle, so unrelated
/// traffic never serializes behind a hot product.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DbPool>,
    max_retries: u32,
}

impl AnalyticsService {
    pub fn new(db: Arc<DbPool>, max_retries: u32) -> Self {
        Self { db, max_retries }
    }

    /// Increments the view count for a product by one.
    #[instrument(skip(self))]
    pub async fn increment_view(&self, product_id: Uuid) -> Result<(), ServiceError> {
        counter!("storefront_analytics.view_increments", 1);
        self.increment(product_id, 1, 0).await
    }

    /// Increments the order count for a product by the fulfilled quantity.
    #[instrument(skip(self))]
    pub async fn increment_order(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "order increment quantity must be positive".to_string(),
            ));
        }
        counter!("storefront_analytics.order_increments", 1);
        self.increment(product_id, 0, i64::from(quantity)).await
    }

    async fn increment(
        &self,
        product_id: Uuid,
        views: i64,
        orders: i64,
    ) -> Result<(), ServiceError> {
        // The product must exist; counters are never created for unknown ids.
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        for attempt in 0..self.max_retries {
            let existing = AnalyticsCounter::find()
                .filter(analytics_counter::Column::ProductId.eq(product_id))
                .one(&*self.db)
                .await?;

            match existing {
                None => {
                    // Lazily create the row with the increment already applied.
                    let now = Utc::now();
                    let row = analytics_counter::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        product_id: Set(product_id),
                        view_count: Set(views),
                        order_count: Set(orders),
                        version: Set(0),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };

                    match row.insert(&*self.db).await {
                        Ok(_) => return Ok(()),
                        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                            // Another writer created the row first; re-read it.
                            debug!(
                                "Counter insert conflict for product {} (attempt {})",
                                product_id, attempt
                            );
                            counter!("storefront_analytics.counter_conflicts", 1);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(row) => {
                    let result = AnalyticsCounter::update_many()
                        .col_expr(
                            analytics_counter::Column::ViewCount,
                            Expr::value(row.view_count + views),
                        )
                        .col_expr(
                            analytics_counter::Column::OrderCount,
                            Expr::value(row.order_count + orders),
                        )
                        .col_expr(
                            analytics_counter::Column::Version,
                            Expr::value(row.version + 1),
                        )
                        .col_expr(analytics_counter::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(analytics_counter::Column::Id.eq(row.id))
                        .filter(analytics_counter::Column::Version.eq(row.version))
                        .exec(&*self.db)
                        .await?;

                    if result.rows_affected == 1 {
                        return Ok(());
                    }

                    warn!(
                        "Counter version conflict for product {} (attempt {})",
                        product_id, attempt
                    );
                    counter!("storefront_analytics.counter_conflicts", 1);
                }
            }
        }

        counter!("storefront_analytics.counter_retries_exhausted", 1);
        Err(ServiceError::ConcurrentModification(product_id))
    }

    /// Every product paired with its counts, zero-filled for products without
    /// a counter row, in the requested order.
    #[instrument(skip(self))]
    pub async fn list_product_analytics(
        &self,
        sort: AnalyticsSort,
    ) -> Result<Vec<ProductAnalytics>, ServiceError> {
        let rows = Product::find()
            .find_also_related(AnalyticsCounter)
            .all(&*self.db)
            .await?;

        let mut listing: Vec<ProductAnalytics> = rows
            .into_iter()
            .map(|(product, tracked)| ProductAnalytics {
                product_id: product.id,
                name: product.name,
                view_count: tracked.as_ref().map_or(0, |c| c.view_count),
                order_count: tracked.map_or(0, |c| c.order_count),
            })
            .collect();

        match sort {
            AnalyticsSort::ViewsAsc => listing.sort_by(|a, b| {
                a.view_count
                    .cmp(&b.view_count)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            AnalyticsSort::ViewsDesc => listing.sort_by(|a, b| {
                b.view_count
                    .cmp(&a.view_count)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            AnalyticsSort::OrdersAsc => listing.sort_by(|a, b| {
                a.order_count
                    .cmp(&b.order_count)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            AnalyticsSort::OrdersDesc => listing.sort_by(|a, b| {
                b.order_count
                    .cmp(&a.order_count)
                    .then_with(|| a.name.cmp(&b.name))
            }),
        }

        Ok(listing)
    }

    /// Catalog-wide totals.
    pub async fn summary(&self) -> Result<AnalyticsSummary, ServiceError> {
        let total_products = Product::find().count(&*self.db).await?;

        let counters = AnalyticsCounter::find().all(&*self.db).await?;
        let total_views = counters.iter().map(|c| c.view_count).sum();
        let total_orders = counters.iter().map(|c| c.order_count).sum();

        Ok(AnalyticsSummary {
            total_products,
            total_views,
            total_orders,
        })
    }
}

/// One product's counters, zero-filled when untracked.
#[derive(Debug, Clone, Serialize)]
pub struct ProductAnalytics {
    pub product_id: Uuid,
    pub name: String,
    pub view_count: i64,
    pub order_count: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub total_products: u64,
    pub total_views: i64,
    pub total_orders: i64,
}

/// Sort orders supported by the analytics listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsSort {
    ViewsAsc,
    ViewsDesc,
    OrdersAsc,
    OrdersDesc,
}

impl AnalyticsSort {
    /// Parses the `sort` query value; unknown or absent values fall back to
    /// views-descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("views_asc") => Self::ViewsAsc,
            Some("views_desc") | None => Self::ViewsDesc,
            Some("orders_asc") => Self::OrdersAsc,
            Some("orders_desc") => Self::OrdersDesc,
            Some(other) => {
                warn!("Invalid analytics sort {:?}, using views_desc", other);
                Self::ViewsDesc
            }
        }
    }
}

/// Per-browsing-session set of already-counted product views.
///
/// Consulted before the view increment; the first view in a session counts,
/// repeats do not. State is in-process and best-effort by design.
#[derive(Default)]
pub struct ViewTracker {
    viewed: DashMap<String, HashSet<Uuid>>,
}

impl ViewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_viewed(&self, session_id: &str, product_id: Uuid) -> bool {
        self.viewed
            .get(session_id)
            .map_or(false, |set| set.contains(&product_id))
    }

    pub fn mark_viewed(&self, session_id: &str, product_id: Uuid) {
        self.viewed
            .entry(session_id.to_string())
            .or_default()
            .insert(product_id);
    }
}
