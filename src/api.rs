use crate::data_structures::{
    is_known_index, is_known_stock, FinancialSnapshot, StockBundle, INDEX_SYMBOLS, STOCK_SYMBOLS,
};
use crate::service::DashboardService;
use crate::utils::cache::SharedCache;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Serialize)]
pub struct SymbolCatalog {
    pub indices: Vec<&'static str>,
    pub stocks: Vec<&'static str>,
}

/// The fixed selections offered by the two dashboards.
#[instrument]
pub async fn get_symbols_handler() -> impl IntoResponse {
    debug!("Received request for symbol catalog");
    Json(SymbolCatalog {
        indices: INDEX_SYMBOLS.to_vec(),
        stocks: STOCK_SYMBOLS.to_vec(),
    })
}

#[instrument(skip(service))]
pub async fn get_index_dashboard_handler(
    State(service): State<Arc<DashboardService>>,
    Path(symbol): Path<String>,
) -> Response {
    if !is_known_index(&symbol) {
        warn!(%symbol, "unknown index symbol");
        return (StatusCode::NOT_FOUND, "Unknown index symbol").into_response();
    }

    let frame = service.index_history(&symbol).await;
    info!(symbol = %frame.symbol, rows = frame.rows.len(), "Returning index history");
    (StatusCode::OK, Json(frame)).into_response()
}

/// Everything the stock dashboard renders in one payload: raw history, key
/// metrics, and the financial snapshot.
#[derive(Serialize)]
pub struct StockDashboard {
    #[serde(flatten)]
    pub bundle: StockBundle,
    pub financials: FinancialSnapshot,
}

#[instrument(skip(service))]
pub async fn get_stock_dashboard_handler(
    State(service): State<Arc<DashboardService>>,
    Path(symbol): Path<String>,
) -> Response {
    if !is_known_stock(&symbol) {
        warn!(%symbol, "unknown stock symbol");
        return (StatusCode::NOT_FOUND, "Unknown stock symbol").into_response();
    }

    let (bundle, financials) = futures::join!(
        service.stock_bundle(&symbol),
        service.financial_snapshot(&symbol),
    );

    info!(
        %symbol,
        rows = bundle.rows.len(),
        periods = financials.periods.len(),
        "Returning stock dashboard"
    );
    (StatusCode::OK, Json(StockDashboard { bundle, financials })).into_response()
}

/// Global invalidation: the "retry fetch" action on either dashboard clears
/// the whole cache, not just the selected symbol.
#[instrument(skip(cache))]
pub async fn invalidate_cache_handler(State(cache): State<SharedCache>) -> impl IntoResponse {
    cache.lock().await.invalidate_all();
    info!("Cache invalidated by user request");
    (StatusCode::OK, "OK")
}
