//! Operator HTTP surface for the two-phase commit engines.
//!
//! Exposes health, Prometheus metrics, raised operator alerts and a
//! demonstration endpoint that runs whole transactions against an in-process
//! coordination store.

pub mod config;
pub mod error;
pub mod routes;

use std::collections::VecDeque;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use coord_store::InMemoryCoordinationStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use twopc::InMemoryAlertSink;

use config::Config;
use routes::transactions::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/alerts", get(routes::alerts::list))
        .route(
            "/transactions",
            get(routes::transactions::list).post(routes::transactions::run),
        )
        .route("/transactions/{id}", get(routes::transactions::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a fresh in-memory store.
pub fn create_default_state(config: &Config) -> Arc<AppState> {
    Arc::new(AppState {
        store: InMemoryCoordinationStore::new(),
        alerts: InMemoryAlertSink::new(),
        coordinator_config: config.coordinator_config(),
        participant_config: config.participant_config(),
        history: RwLock::new(VecDeque::new()),
    })
}
