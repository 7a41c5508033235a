use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatra_api::{app, worker, AppState, AuthConfig, Metrics};
use yatra_booking::BookingService;
use yatra_core::{LogNotificationSink, NotificationSink};
use yatra_store::{Config, DbClient, EventProducer, KafkaNotificationSink, PgLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yatra_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Yatra API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await?;
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to read business rules")?;

    let notifier: Arc<dyn NotificationSink> = match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Arc::new(KafkaNotificationSink::new(producer, kafka.notification_topic.clone()))
        }
        None => {
            tracing::warn!("No Kafka configured, notifications will only be logged");
            Arc::new(LogNotificationSink)
        }
    };

    let ledger = Arc::new(PgLedger::new(db.pool.clone()));
    let service = Arc::new(BookingService::new(
        ledger.clone(),
        ledger.clone(),
        ledger,
        notifier,
        rules.clone(),
        config.pricing.clone(),
    ));
    let metrics = Arc::new(Metrics::new()?);

    worker::spawn_workers(service.clone(), metrics.clone(), &rules);

    let app_state = AppState {
        service,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        metrics,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
