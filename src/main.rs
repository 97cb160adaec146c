use std::{sync::Arc, time::Duration};

use tokio::{signal, sync::mpsc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);

    // Payment gateway: HTTP adapter when configured, local sandbox otherwise
    let gateway: Arc<dyn api::services::PaymentGateway> = match cfg.payment_gateway_url.clone() {
        Some(base_url) => {
            info!("Payment gateway configured at {}", base_url);
            Arc::new(api::services::payments::HttpPaymentGateway::new(
                base_url,
                cfg.payment_api_key.clone(),
                cfg.payment_webhook_secret.clone(),
                cfg.payment_webhook_tolerance_secs,
                Duration::from_secs(cfg.payment_gateway_timeout_secs),
                cfg.payment_success_url.clone(),
                cfg.payment_cancel_url.clone(),
            ))
        }
        None => {
            info!("No payment gateway configured; using sandbox sessions");
            Arc::new(api::services::payments::SandboxPaymentGateway::new(
                cfg.payment_webhook_secret.clone(),
                cfg.payment_webhook_tolerance_secs,
                cfg.payment_success_url.clone(),
            ))
        }
    };

    if cfg.mail_relay_url.is_none() {
        info!("Mail relay not configured; outbound email disabled");
    }
    let email = Arc::new(api::services::EmailService::new(
        cfg.mail_relay_url.clone(),
        cfg.mail_from.clone(),
    ));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db.clone(),
        Arc::new(event_sender.clone()),
        gateway,
        email.clone(),
        &cfg,
    );

    // Spawn the side-effect worker feeding off committed events
    let processor =
        api::events::EventProcessor::new(db.clone(), services.analytics.clone(), email);
    tokio::spawn(processor.run(event_rx));

    // Background maintenance: orphaned-order reaper and monthly report run
    tokio::spawn(api::services::orders::run_orphan_reaper(
        services.order.clone(),
        cfg.orphan_max_age_secs,
    ));
    tokio::spawn(api::services::reports::run_monthly_scheduler(
        services.reports.clone(),
        cfg.report_check_interval_secs,
    ));

    let cors_layer = if cfg.is_development() {
        info!("Using permissive CORS for development");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let state = Arc::new(api::AppState {
        db,
        config: Arc::new(cfg.clone()),
        event_sender,
        services,
    });

    let app = api::app(state).layer(cors_layer);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("storefront-api listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
