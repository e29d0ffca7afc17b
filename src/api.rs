//! HTTP server for prices, health and metrics

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::info;

use crate::pricing::PricingService;
use crate::types::{ChainAssetMap, ChainId};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PricingService>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub reference_asset_price: Option<String>,
    pub last_successful_refresh: Option<String>,
}

#[derive(Serialize)]
pub struct TokenPriceResponse {
    pub chain_id: ChainId,
    pub asset: String,
    pub usd_price: Option<String>,
    pub min_amount_with_fee: String,
    pub default_min_amount: String,
}

/// Maps keyed by chain id string with sorted entries
fn sorted<T: Clone>(map: ChainAssetMap<T>) -> BTreeMap<String, BTreeMap<String, T>> {
    map.into_iter()
        .map(|(chain_id, assets)| (chain_id.to_string(), assets.into_iter().collect()))
        .collect()
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let last = state.service.last_successful_refresh().await;
    Json(HealthResponse {
        status: if last.is_some() { "healthy" } else { "starting" }.to_string(),
        reference_asset_price: state
            .service
            .reference_asset_price()
            .await
            .map(|p| p.to_string()),
        last_successful_refresh: last.map(|t| t.to_rfc3339()),
    })
}

/// Liveness probe
async fn liveness() -> &'static str {
    "OK"
}

/// Ready once one refresh has resolved every asset
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.service.last_successful_refresh().await.is_some() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn min_amounts(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, BTreeMap<String, String>>> {
    Json(sorted(state.service.get_min_amounts_for_api().await))
}

async fn nft_fees(State(state): State<AppState>) -> Json<BTreeMap<String, BTreeMap<String, i64>>> {
    Json(sorted(state.service.get_nft_fees_for_api().await))
}

async fn token_price(
    State(state): State<AppState>,
    Path((chain_id, asset)): Path<(u64, String)>,
) -> Response {
    match state
        .service
        .get_token_price_info(ChainId(chain_id), &asset)
        .await
    {
        Some(info) => Json(TokenPriceResponse {
            chain_id: ChainId(chain_id),
            asset,
            usd_price: info.usd_price.map(|p| p.to_string()),
            min_amount_with_fee: info.min_amount_with_fee.to_string(),
            default_min_amount: info.default_min_amount.to_string(),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "unknown asset").into_response(),
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(service: Arc<PricingService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/min-amounts", get(min_amounts))
        .route("/nft-fees", get(nft_fees))
        .route("/token-price/{chain_id}/{asset}", get(token_price))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { service })
}

/// Serve the API until the process exits
pub async fn start_server(
    bind_address: &str,
    port: u16,
    service: Arc<PricingService>,
) -> eyre::Result<()> {
    let app = router(service);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("API server listening on {}", addr);
    info!("  /min-amounts - Minimum transfer amounts (JSON)");
    info!("  /nft-fees    - NFT fees (JSON)");
    info!("  /metrics     - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
