//! USD price sources
//!
//! Sources are queried in priority order (primary first). Every call is
//! bounded by a timeout; a timeout counts as a source failure.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use num_traits::Signed;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::metrics;
use crate::types::{ChainId, ChainPrices, ProviderIds};

pub mod coingecko;
pub mod coinmarketcap;

pub use coingecko::CoinGeckoSource;
pub use coinmarketcap::CoinMarketCapSource;

/// A USD price provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    /// Prices for every (chain, asset) in `ids`. Assets the provider does not
    /// know are left out of the result.
    async fn usd_prices(&self, ids: &ProviderIds) -> Result<ChainPrices, SourceError>;

    /// Price of the reference asset
    async fn reference_asset_usd_price(&self) -> Result<BigDecimal, SourceError>;
}

/// A source together with the provider ids it understands
#[derive(Clone)]
pub struct PriceSourceBinding {
    pub source: Arc<dyn PriceSource>,
    pub ids: ProviderIds,
}

impl PriceSourceBinding {
    pub fn new(source: Arc<dyn PriceSource>, ids: ProviderIds) -> Self {
        Self { source, ids }
    }
}

/// Result of asking one source for the bulk price set
#[derive(Debug)]
pub struct SourcePrices {
    pub source: String,
    pub prices: Result<ChainPrices, SourceError>,
}

impl SourcePrices {
    /// Positive price for (chain, asset), or why there is none
    pub fn price_for(&self, chain_id: ChainId, asset: &str) -> Result<&BigDecimal, String> {
        match &self.prices {
            Err(e) => Err(e.to_string()),
            Ok(prices) => match prices.get(&chain_id).and_then(|m| m.get(asset)) {
                None => Err(format!("{} returned no price", self.source)),
                Some(price) if !price.is_positive() => {
                    Err(format!("{} returned non-positive price {}", self.source, price))
                }
                Some(price) => Ok(price),
            },
        }
    }
}

/// Result of asking one source for the reference asset price
#[derive(Debug)]
pub struct ReferencePrice {
    pub source: String,
    pub price: Result<BigDecimal, SourceError>,
}

/// Ordered list of price sources with a shared per-call timeout
#[derive(Clone)]
pub struct SourceChain {
    sources: Vec<PriceSourceBinding>,
    timeout: Duration,
}

impl SourceChain {
    pub fn new(sources: Vec<PriceSourceBinding>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Query sources in order until every expected asset has a positive price.
    ///
    /// Returns one entry per queried source, in query order. Later sources are
    /// only asked when an earlier one failed or left assets unpriced.
    pub async fn fetch_usd_prices(&self, expected: &[(ChainId, String)]) -> Vec<SourcePrices> {
        let mut outcomes: Vec<SourcePrices> = Vec::with_capacity(self.sources.len());

        for binding in &self.sources {
            let name = binding.source.name().to_string();
            let result = tokio::time::timeout(self.timeout, binding.source.usd_prices(&binding.ids))
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout {
                        source_name: name.clone(),
                        secs: self.timeout.as_secs(),
                    })
                });

            match &result {
                Ok(prices) => debug!(
                    source = %name,
                    chains = prices.len(),
                    "Fetched USD prices"
                ),
                Err(e) => {
                    warn!(source = %name, error = %e, "Price source failed");
                    metrics::record_source_failure(&name);
                }
            }

            outcomes.push(SourcePrices {
                source: name,
                prices: result,
            });

            let missing = unpriced(expected, &outcomes);
            if missing.is_empty() {
                break;
            }
            debug!(
                missing = missing.len(),
                "Assets still unpriced, trying next source"
            );
        }

        outcomes
    }

    /// Query sources in order until one returns a positive reference price.
    pub async fn fetch_reference_price(&self) -> Vec<ReferencePrice> {
        let mut attempts = Vec::with_capacity(self.sources.len());

        for binding in &self.sources {
            let name = binding.source.name().to_string();
            let result =
                tokio::time::timeout(self.timeout, binding.source.reference_asset_usd_price())
                    .await
                    .unwrap_or_else(|_| {
                        Err(SourceError::Timeout {
                            source_name: name.clone(),
                            secs: self.timeout.as_secs(),
                        })
                    });

            let done = match &result {
                Ok(price) if price.is_positive() => true,
                Ok(price) => {
                    warn!(source = %name, %price, "Reference price is not positive");
                    false
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Reference price source failed");
                    metrics::record_source_failure(&name);
                    false
                }
            };

            attempts.push(ReferencePrice {
                source: name,
                price: result,
            });
            if done {
                break;
            }
        }

        attempts
    }
}

fn unpriced<'a>(
    expected: &'a [(ChainId, String)],
    outcomes: &[SourcePrices],
) -> HashSet<&'a (ChainId, String)> {
    expected
        .iter()
        .filter(|(chain_id, asset)| {
            !outcomes
                .iter()
                .any(|o| o.price_for(*chain_id, asset).is_ok())
        })
        .collect()
}

/// Unique provider ids in stable order, for building query strings
pub(crate) fn unique_ids(ids: &ProviderIds) -> Vec<String> {
    let mut unique: Vec<String> = ids
        .values()
        .flat_map(|assets| assets.values().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    unique.sort();
    unique
}

/// Parse a JSON number or numeric string without going through `f64`
pub(crate) fn parse_usd(value: &serde_json::Value) -> Option<BigDecimal> {
    use std::str::FromStr;
    match value {
        serde_json::Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => BigDecimal::from_str(s).ok(),
        _ => None,
    }
}

/// Map per-id prices back onto the (chain, asset) layout of `ids`
pub(crate) fn prices_by_asset(
    ids: &ProviderIds,
    lookup: impl Fn(&str) -> Option<BigDecimal>,
) -> ChainPrices {
    let mut result = ChainPrices::new();
    for (chain_id, assets) in ids {
        for (asset, id) in assets {
            if let Some(price) = lookup(id) {
                result
                    .entry(*chain_id)
                    .or_default()
                    .insert(asset.clone(), price);
            }
        }
    }
    result
}
