mod common;

use std::sync::Arc;

use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront_api::{
    entities::{ReportRecord, ReportStatus},
    errors::ServiceError,
    services::{reports::ReportService, EmailService},
};

#[tokio::test]
async fn report_snapshot_captures_current_totals() {
    let app = TestApp::new().await;
    app.create_user("admin@example.com", true).await;
    let a = app.create_product("A", dec!(1.00), true).await;
    let b = app.create_product("B", dec!(2.00), true).await;

    let analytics = &app.state.services.analytics;
    analytics.increment_view(a.id).await.unwrap();
    analytics.increment_view(b.id).await.unwrap();
    analytics.increment_order(a.id, 3).await.unwrap();

    let record = app
        .state
        .services
        .reports
        .generate("2026-07")
        .await
        .unwrap();

    assert_eq!(record.status, ReportStatus::Sent);
    assert_eq!(record.period, "2026-07");
    assert_eq!(record.total_products, 2);
    assert_eq!(record.total_views, 2);
    assert_eq!(record.total_orders, 3);
    assert!(record.error_detail.is_none());
}

#[tokio::test]
async fn sent_reports_are_not_generated_twice() {
    let app = TestApp::new().await;
    app.create_user("admin@example.com", true).await;
    let product = app.create_product("A", dec!(1.00), true).await;
    app.state
        .services
        .analytics
        .increment_view(product.id)
        .await
        .unwrap();

    let reports = &app.state.services.reports;
    let first = reports.generate("2026-07").await.unwrap();
    assert_eq!(first.status, ReportStatus::Sent);
    assert_eq!(first.total_views, 1);

    // Activity after the first send must not leak into a repeat call
    app.state
        .services
        .analytics
        .increment_view(product.id)
        .await
        .unwrap();

    let second = reports.generate("2026-07").await.unwrap();
    assert_eq!(second.status, ReportStatus::Sent);
    assert_eq!(second.id, first.id);
    assert_eq!(second.total_views, 1);

    let rows = ReportRecord::find().count(&*app.state.db).await.unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn missing_admin_directory_still_marks_sent_with_a_note() {
    let app = TestApp::new().await;
    app.create_product("A", dec!(1.00), true).await;

    let record = app
        .state
        .services
        .reports
        .generate("2026-06")
        .await
        .unwrap();

    assert_eq!(record.status, ReportStatus::Sent);
    assert_eq!(record.error_detail.as_deref(), Some("no admin recipients"));
}

#[tokio::test]
async fn delivery_failure_marks_failed_and_a_later_run_can_recover() {
    let app = TestApp::new().await;
    app.create_user("admin@example.com", true).await;
    app.create_product("A", dec!(1.00), true).await;

    // Relay that nothing listens on: delivery fails fast
    let broken_email = Arc::new(EmailService::new(
        Some("http://127.0.0.1:1/send".to_string()),
        "orders@storefront.example".to_string(),
    ));
    let failing_reports = ReportService::new(
        app.state.db.clone(),
        app.state.services.analytics.clone(),
        broken_email,
        Arc::new(app.state.event_sender.clone()),
    );

    let record = failing_reports.generate("2026-05").await.unwrap();
    assert_eq!(record.status, ReportStatus::Failed);
    assert!(record.error_detail.is_some());

    // The failure never escaped, and the period can still reach SENT later
    let recovered = app
        .state
        .services
        .reports
        .generate("2026-05")
        .await
        .unwrap();
    assert_eq!(recovered.status, ReportStatus::Sent);
    assert_eq!(recovered.id, record.id);

    let rows = ReportRecord::find().count(&*app.state.db).await.unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn malformed_periods_are_rejected() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .reports
        .generate("monthly")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = app
        .state
        .services
        .reports
        .generate("2026-13")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
