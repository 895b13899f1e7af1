pub mod api;
pub mod config;
pub mod data_structures;
pub mod indicators;
pub mod provider;
pub mod retry;
pub mod service;
pub mod utils;

use crate::provider::{SharedSource, YahooClient};
use crate::service::DashboardService;
use crate::utils::cache::{FrameCache, SharedCache};
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
    service: Arc<DashboardService>,
    cache: SharedCache,
}

impl FromRef<AppState> for Arc<DashboardService> {
    fn from_ref(app_state: &AppState) -> Arc<DashboardService> {
        app_state.service.clone()
    }
}

impl FromRef<AppState> for SharedCache {
    fn from_ref(app_state: &AppState) -> SharedCache {
        app_state.cache.clone()
    }
}

#[tokio::main]
async fn main() {
    let app_config = config::AppConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    tracing::info!("Starting marketdash");
    tracing::info!(
        environment = %app_config.environment,
        port = app_config.port,
        cache_ttl_secs = app_config.cache_ttl.as_secs(),
        retry_max_attempts = app_config.retry.max_attempts,
        "Loaded configuration"
    );

    let client = YahooClient::new(
        &app_config.provider_base_url,
        true,
        app_config.provider_rate_limit_per_minute,
    )
    .expect("failed to build provider client");

    let source: SharedSource = Arc::new(Mutex::new(client));
    let cache: SharedCache = Arc::new(Mutex::new(FrameCache::new(app_config.cache_ttl)));
    let service = Arc::new(DashboardService::new(
        source,
        cache.clone(),
        app_config.retry,
    ));

    let app_state = AppState { service, cache };

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default().per_second(10).burst_size(20).finish().unwrap(),
    );

    let app = Router::new()
        .route("/symbols", get(api::get_symbols_handler))
        .route("/dashboards/indices/{symbol}", get(api::get_index_dashboard_handler))
        .route("/dashboards/stocks/{symbol}", get(api::get_stock_dashboard_handler))
        .route(
            "/cache/invalidate",
            post(api::invalidate_cache_handler).layer(GovernorLayer::new(governor_conf)),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!(%addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
