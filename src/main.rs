use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airpesa_backend::config::AppConfig;
use airpesa_backend::services::airtime_provider::AirtimeApiClient;
use airpesa_backend::services::chain::PaymentChainService;
use airpesa_backend::services::order_store::SeaOrmOrderStore;
use airpesa_backend::services::price_oracle::PriceOracleService;
use airpesa_backend::services::saga::SagaCoordinator;
use airpesa_backend::{api_router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,airpesa_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env().expect("Invalid configuration"));

    if config.callback_trusted_ips.is_empty() {
        tracing::warn!(
            "CALLBACK_TRUSTED_IPS is empty; validation callback source checks are DISABLED"
        );
    }

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(SeaOrmOrderStore::new(db));
    let rates = Arc::new(PriceOracleService::new(&config.price, store.clone()));
    let chain = Arc::new(
        PaymentChainService::new(&config.chain)
            .await
            .expect("Failed to initialize chain client"),
    );
    let provider = Arc::new(AirtimeApiClient::new(&config.provider));

    let saga = Arc::new(SagaCoordinator::new(
        store.clone(),
        rates.clone(),
        chain,
        provider,
        config.service_fee_usdc,
    ));

    let state = AppState {
        saga,
        store,
        rates,
        config: config.clone(),
    };

    // Build router
    let app = api_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
