// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::order_store::OrderStore;
use crate::services::price_oracle::RateOracle;
use crate::services::saga::SagaCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub saga: Arc<SagaCoordinator>,
    pub store: Arc<dyn OrderStore>,
    pub rates: Arc<dyn RateOracle>,
    pub config: Arc<AppConfig>,
}

pub mod entities {
    pub mod prelude;
    pub mod airtime_transactions;
    pub mod orders;
    pub mod price_snapshots;
}

pub mod services {
    pub mod airtime_provider;
    pub mod chain;
    pub mod country;
    pub mod order_store;
    pub mod price_oracle;
    pub mod saga;
}

pub mod models {
    pub mod airtime;
    pub mod order;
    pub mod price;
}

pub mod handlers {
    pub mod airtime_callback;
    pub mod order;
    pub mod payment;
    pub mod price;
}

pub mod config;

/// Full API surface. Shared between the binary and the integration tests.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/orders", post(handlers::order::create_order))
        .route(
            "/api/orders/{order_ref}",
            get(handlers::order::get_order_status),
        )
        .route("/api/airtime/send", post(handlers::payment::submit_payment))
        .route(
            "/api/airtime/status",
            post(handlers::airtime_callback::delivery_status),
        )
        .route(
            "/api/airtime/validate",
            post(handlers::airtime_callback::validate),
        )
        .route("/api/prices/{currency}", get(handlers::price::get_price))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
