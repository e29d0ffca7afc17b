use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, WrapErr};

use pricing::config::{AssetsFile, Config};
use pricing::registry::StaticAssetRegistry;
use pricing::sources::{
    CoinGeckoSource, CoinMarketCapSource, PriceSourceBinding, SourceChain,
};
use pricing::types::{ChainId, ProviderIds};
use pricing::{api, scheduler, PricingService, PricingSettings};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting CL8Y Bridge Pricing");

    let config = Config::load()?;
    tracing::info!(
        assets = %config.assets_config_path,
        refresh_interval_secs = config.refresh_interval_secs,
        fallback_source = config.coinmarketcap.is_some(),
        "Configuration loaded"
    );

    let assets = config.load_assets()?;
    let registry = StaticAssetRegistry::from_assets_file(&assets)?;
    let settings = PricingSettings::from_assets_file(&assets)?;
    tracing::info!(
        networks = assets.networks.len(),
        reference_chain_id = %settings.reference_chain_id,
        reference_asset = %settings.reference_asset,
        nft_fees = settings.nft_fees.len(),
        "Asset registry loaded"
    );

    let sources = build_sources(&config, &assets)?;
    let service = Arc::new(PricingService::new(Arc::new(registry), sources, settings)?);

    // Nothing safe to serve without a first complete price set
    service
        .fetch_and_update_usd_prices()
        .await
        .wrap_err("Initial price fetch failed")?;
    tracing::info!("Initial prices loaded");

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let api_service = service.clone();
    let bind_address = config.api.bind_address.clone();
    let port = config.api.port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(&bind_address, port, api_service).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    scheduler::run_refresh_loop(
        service,
        Duration::from_secs(config.refresh_interval_secs),
        shutdown_rx,
    )
    .await?;

    tracing::info!("CL8Y Bridge Pricing stopped");
    Ok(())
}

/// CoinGecko first, CoinMarketCap as fallback when configured
fn build_sources(config: &Config, assets: &AssetsFile) -> eyre::Result<SourceChain> {
    let timeout = Duration::from_secs(config.source_timeout_secs);
    let reference = ChainId(assets.reference_asset.chain_id);
    let reference_ids = assets
        .reference_price_ids()
        .ok_or_else(|| eyre!("reference asset has no price ids"))?;

    let coingecko_reference = reference_ids
        .coingecko
        .as_deref()
        .ok_or_else(|| eyre!("reference asset has no coingecko price id"))?;
    let coingecko = CoinGeckoSource::new(
        &config.coingecko.api_url,
        config.coingecko.api_key.clone(),
        coingecko_reference,
        timeout,
    )?;
    let mut bindings = vec![PriceSourceBinding::new(
        Arc::new(coingecko),
        without_reference(
            assets.provider_ids(|ids| ids.coingecko.as_ref()),
            reference,
            &assets.reference_asset.asset,
        ),
    )];

    if let Some(ref cmc) = config.coinmarketcap {
        match (cmc.api_key.as_deref(), reference_ids.coinmarketcap.as_deref()) {
            (Some(api_key), Some(cmc_reference)) => {
                let source =
                    CoinMarketCapSource::new(&cmc.api_url, api_key, cmc_reference, timeout)?;
                bindings.push(PriceSourceBinding::new(
                    Arc::new(source),
                    without_reference(
                        assets.provider_ids(|ids| ids.coinmarketcap.as_ref()),
                        reference,
                        &assets.reference_asset.asset,
                    ),
                ));
            }
            _ => tracing::warn!(
                "CoinMarketCap configured but the reference asset has no coinmarketcap id; fallback disabled"
            ),
        }
    }

    tracing::info!(sources = bindings.len(), "Price sources configured");
    Ok(SourceChain::new(bindings, timeout))
}

/// The reference asset is priced through its own endpoint
fn without_reference(mut ids: ProviderIds, chain_id: ChainId, asset: &str) -> ProviderIds {
    if let Some(assets) = ids.get_mut(&chain_id) {
        assets.remove(asset);
    }
    ids
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pricing=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
