use anyhow::Context;
use roadbuddy_api::{
    app,
    state::{AppState, AuthConfig, RateLimit},
};
use roadbuddy_booking::{AuthorizerConfig, Engine, EngineConfig, RetryPolicy, SimulatedGateway, Stores};
use roadbuddy_catalog::fare::FareConfig;
use roadbuddy_core::events::FanoutEventSink;
use roadbuddy_core::EventSink;
use roadbuddy_store::app_config::Config;
use roadbuddy_store::memory::{
    InMemoryBookingRepository, InMemoryObligationRepository, InMemoryPaymentMethodRepository,
    InMemoryTransactionRepository, InMemoryTripRepository,
};
use roadbuddy_store::{
    BroadcastEventSink, DbClient, EventProducer, KafkaEventSink, RedisClient, StoreBookingRepository,
    StoreObligationRepository, StorePaymentMethodRepository, StoreTransactionRepository, StoreTripRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roadbuddy_api=debug,roadbuddy_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting RoadBuddy API on port {}", config.server.port);

    let stores = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Stores {
                trips: Arc::new(StoreTripRepository::new(db.pool.clone())),
                bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
                transactions: Arc::new(StoreTransactionRepository::new(db.pool.clone())),
                methods: Arc::new(StorePaymentMethodRepository::new(db.pool.clone())),
                obligations: Arc::new(StoreObligationRepository::new(db.pool)),
            }
        }
        None => {
            tracing::warn!("No database configured; using in-memory stores");
            Stores {
                trips: Arc::new(InMemoryTripRepository::new()),
                bookings: Arc::new(InMemoryBookingRepository::new()),
                transactions: Arc::new(InMemoryTransactionRepository::new()),
                methods: Arc::new(InMemoryPaymentMethodRepository::new()),
                obligations: Arc::new(InMemoryObligationRepository::new()),
            }
        }
    };

    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured; rate limiting disabled");
            None
        }
    };

    // SSE subscribers and, when configured, Kafka
    let live = Arc::new(BroadcastEventSink::new(256));
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![live.clone()];
    if let Some(brokers) = &config.kafka.brokers {
        let producer = EventProducer::new(brokers).context("Failed to create Kafka producer")?;
        let (kafka, _publisher) = KafkaEventSink::start(producer);
        sinks.push(Arc::new(kafka));
    }
    let events: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(sinks));

    let gateway = Arc::new(SimulatedGateway::new().with_decline_over(config.payment.decline_over));
    let engine = Engine::new(
        stores,
        gateway,
        events,
        EngineConfig {
            currency: config.payment.currency.clone(),
            fare: FareConfig::default(),
            authorizer: AuthorizerConfig {
                timeout: Duration::from_millis(config.payment.timeout_ms),
                breaker_failure_threshold: config.payment.breaker_failure_threshold,
                breaker_reset: Duration::from_secs(config.payment.breaker_reset_seconds),
            },
            retry: RetryPolicy::new(
                config.retry.max_retries,
                Duration::from_millis(config.retry.initial_delay_ms),
                Duration::from_millis(config.retry.max_delay_ms),
            ),
            sweep_interval: Duration::from_secs(config.obligations.sweep_interval_seconds),
        },
    );
    engine.sweeper.clone().spawn();

    let app_state = AppState::new(
        engine,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        live,
        redis,
        RateLimit {
            requests: config.rate_limit.requests,
            window_seconds: config.rate_limit.window_seconds,
        },
    )
    .context("Failed to register metrics")?;

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
