#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db,
    entities::{product, user, ProductModel, UserModel},
    events::{EventProcessor, EventSender},
    handlers::AppServices,
    services::{payments::SandboxPaymentGateway, EmailService},
    AppState,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Helper harness for spinning up application state backed by a throwaway
/// SQLite database.
pub struct TestApp {
    pub state: Arc<AppState>,
    _db_file: tempfile::NamedTempFile,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = tempfile::NamedTempFile::new().expect("failed to create temp db file");
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());

        let mut cfg = AppConfig::new(url, "127.0.0.1".to_string(), 18_080, "test".to_string());
        // A single pooled connection keeps SQLite happy under concurrent
        // writers while still interleaving read-modify-write cycles.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.counter_max_retries = 10;
        cfg.payment_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);

        let gateway = Arc::new(SandboxPaymentGateway::new(
            Some(TEST_WEBHOOK_SECRET.to_string()),
            cfg.payment_webhook_tolerance_secs,
            cfg.payment_success_url.clone(),
        ));
        let email = Arc::new(EmailService::disabled());

        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            gateway,
            email.clone(),
            &cfg,
        );

        let processor = EventProcessor::new(db.clone(), services.analytics.clone(), email);
        let event_task = tokio::spawn(processor.run(event_rx));

        let state = Arc::new(AppState {
            db,
            config: Arc::new(cfg),
            event_sender,
            services,
        });

        Self {
            state,
            _db_file: db_file,
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> Router {
        storefront_api::app(self.state.clone())
    }

    pub async fn create_user(&self, email: &str, is_admin: bool) -> UserModel {
        let now = Utc::now();
        let row = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            name: Set(email.split('@').next().unwrap_or("user").to_string()),
            is_admin: Set(is_admin),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(&*self.state.db)
            .await
            .expect("failed to create test user")
    }

    pub async fn create_product(&self, name: &str, price: Decimal, available: bool) -> ProductModel {
        let now = Utc::now();
        let row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            available: Set(available),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(&*self.state.db)
            .await
            .expect("failed to create test product")
    }
}

/// Polls `check` until it returns true or the timeout elapses. Used for
/// assertions on side effects applied by the background event worker.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
