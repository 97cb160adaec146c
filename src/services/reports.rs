use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{report_record, user, ReportRecord, ReportRecordModel, ReportStatus, User},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{analytics::AnalyticsService, analytics::AnalyticsSort, email::EmailService},
};

/// Periodic analytics report generation.
///
/// At most one report per period reaches SENT; repeat generation attempts for
/// an already-sent period are no-ops. Delivery failures mark the record
/// FAILED with detail and never escape this boundary, so a scheduler can keep
/// driving future periods.
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
    analytics: Arc<AnalyticsService>,
    email: Arc<EmailService>,
    event_sender: Arc<EventSender>,
}

struct ReportSnapshot {
    total_products: u64,
    total_views: i64,
    total_orders: i64,
    note: Option<String>,
}

impl ReportService {
    pub fn new(
        db: Arc<DbPool>,
        analytics: Arc<AnalyticsService>,
        email: Arc<EmailService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            analytics,
            email,
            event_sender,
        }
    }

    /// Generates and delivers the report for one period.
    #[instrument(skip(self))]
    pub async fn generate(&self, period: &str) -> Result<ReportRecordModel, ServiceError> {
        validate_period(period)?;

        let existing = ReportRecord::find()
            .filter(report_record::Column::Period.eq(period))
            .one(&*self.db)
            .await?;

        if let Some(record) = &existing {
            if record.status == ReportStatus::Sent {
                info!("Report for {} already sent, skipping", period);
                return Ok(record.clone());
            }
        }

        let now = Utc::now();
        let record = match existing {
            Some(record) => {
                let mut active: report_record::ActiveModel = record.into();
                active.status = Set(ReportStatus::Generating);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                let active = report_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    period: Set(period.to_string()),
                    status: Set(ReportStatus::Generating),
                    total_products: Set(0),
                    total_views: Set(0),
                    total_orders: Set(0),
                    error_detail: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&*self.db).await?
            }
        };

        let outcome = self.snapshot_and_send(period).await;

        let mut active: report_record::ActiveModel = record.into();
        match outcome {
            Ok(snapshot) => {
                active.status = Set(ReportStatus::Sent);
                active.total_products = Set(snapshot.total_products as i64);
                active.total_views = Set(snapshot.total_views);
                active.total_orders = Set(snapshot.total_orders);
                active.error_detail = Set(snapshot.note);
                info!("Report for {} sent", period);
            }
            Err(e) => {
                error!("Report generation for {} failed: {}", period, e);
                active.status = Set(ReportStatus::Failed);
                active.error_detail = Set(Some(e.to_string()));
            }
        }
        active.updated_at = Set(Utc::now());

        let saved = active.update(&*self.db).await?;
        if saved.status == ReportStatus::Sent {
            self.event_sender
                .send_or_log(Event::ReportSent {
                    period: period.to_string(),
                })
                .await;
        }

        Ok(saved)
    }

    async fn snapshot_and_send(&self, period: &str) -> Result<ReportSnapshot, ServiceError> {
        let listing = self
            .analytics
            .list_product_analytics(AnalyticsSort::ViewsDesc)
            .await?;
        let summary = self.analytics.summary().await?;

        let admins = User::find()
            .filter(user::Column::IsAdmin.eq(true))
            .all(&*self.db)
            .await?;

        let snapshot = ReportSnapshot {
            total_products: summary.total_products,
            total_views: summary.total_views,
            total_orders: summary.total_orders,
            note: None,
        };

        if admins.is_empty() {
            // Delivery is trivially complete with nobody to deliver to; the
            // record still notes it.
            warn!("No admin recipients for report {}", period);
            return Ok(ReportSnapshot {
                note: Some("no admin recipients".to_string()),
                ..snapshot
            });
        }

        let recipients: Vec<String> = admins.into_iter().map(|u| u.email).collect();
        let payload = json!({
            "totalProducts": snapshot.total_products,
            "totalViews": snapshot.total_views,
            "totalOrders": snapshot.total_orders,
            "items": listing,
        });

        self.email
            .send_periodic_report(&recipients, period, payload)
            .await?;

        Ok(snapshot)
    }

    pub async fn get_report(&self, period: &str) -> Result<ReportRecordModel, ServiceError> {
        ReportRecord::find()
            .filter(report_record::Column::Period.eq(period))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Report for {} not found", period)))
    }

    /// All report records, newest period first.
    pub async fn list_reports(&self) -> Result<Vec<ReportRecordModel>, ServiceError> {
        Ok(ReportRecord::find()
            .order_by_desc(report_record::Column::Period)
            .all(&*self.db)
            .await?)
    }
}

/// Period key for the month preceding `now`, e.g. "2026-07".
pub fn previous_period(now: DateTime<Utc>) -> String {
    let first_of_month = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    let last_of_previous = first_of_month - chrono::Duration::days(1);
    last_of_previous.format("%Y-%m").to_string()
}

fn validate_period(period: &str) -> Result<(), ServiceError> {
    NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            ServiceError::ValidationError(format!(
                "Invalid report period {:?}, expected YYYY-MM",
                period
            ))
        })
}

/// Drives report generation for the previous month on a fixed interval.
/// Safe to run at any frequency because generation is idempotent per period.
pub async fn run_monthly_scheduler(service: Arc<ReportService>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(60)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let period = previous_period(Utc::now());
        if let Err(e) = service.generate(&period).await {
            error!("Scheduled report run for {} failed: {}", period, e);
        }
    }
}
