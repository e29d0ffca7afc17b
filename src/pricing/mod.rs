//! Pricing service
//!
//! Owns the price cache, the minimum-amount view and the NFT fee cache, and
//! refreshes them from the price sources and the asset registry.
//!
//! Lock order: `min_amounts_for_api`, then `prices`, then `nft_fees`.
//! Only [`PricingService::fetch_and_update_usd_prices`] holds more than one of
//! them at a time, and it never holds any while waiting on the network.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::future;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::AssetsFile;
use crate::decimal::to_target_amount;
use crate::error::{FeeError, PricingError, UnresolvedAsset};
use crate::fees::calculate_min_amount_with_fee;
use crate::metrics;
use crate::registry::AssetRegistry;
use crate::sources::{ReferencePrice, SourceChain, SourcePrices};
use crate::types::{seeded_map, ChainAssetMap, ChainId, NativeAsset, TokenPriceInfo};

pub mod nft;
pub mod resolution;

pub use nft::{NftFeeCache, NftFeePolicy};
pub use resolution::{Candidates, Resolution};

/// Pricing settings taken from the asset catalogue
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub reference_chain_id: ChainId,
    pub reference_asset: String,
    /// Fee policy per native NFT of the reference chain
    pub nft_fees: HashMap<String, NftFeePolicy>,
}

impl PricingSettings {
    pub fn from_assets_file(file: &AssetsFile) -> Result<Self, PricingError> {
        let reference_chain_id = ChainId(file.reference_asset.chain_id);
        let mut nft_fees = HashMap::new();

        for network in &file.networks {
            for nft in &network.non_fungible {
                let policy = match (nft.fee, nft.fee_in_usd.as_deref()) {
                    (None, None) => continue,
                    (Some(_), Some(_)) => {
                        return Err(PricingError::Config(format!(
                            "NFT {} sets both fee and fee_in_usd",
                            nft.asset
                        )))
                    }
                    (Some(fee), None) if fee < 0 => {
                        return Err(PricingError::Config(format!(
                            "fee for NFT {} is negative",
                            nft.asset
                        )))
                    }
                    (Some(fee), None) => NftFeePolicy::Constant(fee),
                    (None, Some(usd)) => {
                        let usd = BigDecimal::from_str(usd.trim()).map_err(|e| {
                            PricingError::Config(format!(
                                "fee_in_usd for NFT {} is not a decimal ({}): {}",
                                nft.asset, usd, e
                            ))
                        })?;
                        if usd.is_negative() {
                            return Err(PricingError::Config(format!(
                                "fee_in_usd for NFT {} is negative",
                                nft.asset
                            )));
                        }
                        NftFeePolicy::Usd(usd)
                    }
                };

                if ChainId(network.chain_id) != reference_chain_id {
                    return Err(PricingError::Config(format!(
                        "NFT {} on chain {} has a fee but fees are only charged on chain {}",
                        nft.asset, network.chain_id, reference_chain_id
                    )));
                }
                nft_fees.insert(nft.asset.clone(), policy);
            }
        }

        Ok(Self {
            reference_chain_id,
            reference_asset: file.reference_asset.asset.clone(),
            nft_fees,
        })
    }
}

/// Entries to write for one native asset and its wrapped forms
type PriceGroup = Vec<(ChainId, String, TokenPriceInfo)>;

/// What a refresh did, for logging and metrics
#[derive(Debug, Default)]
struct RefreshOutcome {
    live: Vec<(ChainId, String, BigDecimal)>,
    stale: usize,
    unresolved: Vec<UnresolvedAsset>,
}

pub struct PricingService {
    registry: Arc<dyn AssetRegistry>,
    sources: SourceChain,
    reference_chain_id: ChainId,
    reference_asset: String,
    reference_decimals: u8,
    nft_policies: HashMap<String, NftFeePolicy>,

    min_amounts_for_api: RwLock<ChainAssetMap<String>>,
    prices: RwLock<ChainAssetMap<TokenPriceInfo>>,
    nft_fees: RwLock<NftFeeCache>,

    /// Serialises refreshes
    refresh_lock: Mutex<()>,
    last_successful_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl PricingService {
    /// Build the service with every cache seeded for every configured chain.
    ///
    /// Fails on fee configuration that would divide by zero and on a
    /// reference asset the registry does not know.
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        sources: SourceChain,
        settings: PricingSettings,
    ) -> Result<Self, PricingError> {
        let reference_info = registry
            .fungible_asset_info(settings.reference_chain_id, &settings.reference_asset)
            .ok_or_else(|| {
                PricingError::Config(format!(
                    "reference asset {} is unknown on chain {}",
                    settings.reference_asset, settings.reference_chain_id
                ))
            })?;

        for native in native_assets(registry.as_ref()) {
            if native.fee_percentage == 0 {
                return Err(FeeError::ZeroFeePercentage {
                    chain_id: native.chain_id,
                    asset: native.asset,
                }
                .into());
            }
        }

        let networks = registry.network_ids();
        let nft_fees = NftFeeCache::new(&settings.nft_fees);

        Ok(Self {
            registry,
            sources,
            reference_chain_id: settings.reference_chain_id,
            reference_asset: settings.reference_asset,
            reference_decimals: reference_info.decimals,
            nft_policies: settings.nft_fees,
            min_amounts_for_api: RwLock::new(seeded_map(&networks)),
            prices: RwLock::new(seeded_map(&networks)),
            nft_fees: RwLock::new(nft_fees),
            refresh_lock: Mutex::new(()),
            last_successful_refresh: RwLock::new(None),
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Cached pricing record, `None` if the pair has not been priced
    pub async fn get_token_price_info(
        &self,
        chain_id: ChainId,
        asset: &str,
    ) -> Option<TokenPriceInfo> {
        self.prices
            .read()
            .await
            .get(&chain_id)
            .and_then(|assets| assets.get(asset))
            .cloned()
    }

    /// Several records read under one lock, in the order of `keys`
    pub async fn get_token_price_infos(
        &self,
        keys: &[(ChainId, &str)],
    ) -> Vec<Option<TokenPriceInfo>> {
        let prices = self.prices.read().await;
        keys.iter()
            .map(|(chain_id, asset)| cached_entry(&prices, *chain_id, asset).cloned())
            .collect()
    }

    /// Minimum amounts with fee as decimal strings
    pub async fn get_min_amounts_for_api(&self) -> ChainAssetMap<String> {
        self.min_amounts_for_api.read().await.clone()
    }

    /// Fee currently charged for an NFT of the reference chain
    pub async fn get_nft_fee(&self, asset: &str) -> Option<i64> {
        self.nft_fees.read().await.current(asset)
    }

    /// Fee charged before the last recompute
    pub async fn get_nft_prev_fee(&self, asset: &str) -> Option<i64> {
        self.nft_fees.read().await.previous(asset)
    }

    /// NFT fees by chain. Only the reference chain carries entries.
    pub async fn get_nft_fees_for_api(&self) -> ChainAssetMap<i64> {
        let mut view = seeded_map(&self.registry.network_ids());
        let fees = self.nft_fees.read().await;
        let reference = view.entry(self.reference_chain_id).or_default();
        for (asset, fee) in fees.iter() {
            reference.insert(asset.clone(), *fee);
        }
        view
    }

    /// Latest known USD price of the reference asset
    pub async fn reference_asset_price(&self) -> Option<BigDecimal> {
        self.get_token_price_info(self.reference_chain_id, &self.reference_asset)
            .await
            .and_then(|info| info.usd_price)
    }

    /// Time of the last refresh that resolved every asset
    pub async fn last_successful_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_successful_refresh.read().await
    }

    pub fn reference_chain_id(&self) -> ChainId {
        self.reference_chain_id
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Fetch prices and rebuild every cache.
    ///
    /// Each native asset is resolved through the sources in priority order,
    /// then its cached entry, then its static default minimum. The native
    /// asset and all its wrapped forms are written in the same critical
    /// section. Assets that cannot be resolved keep their previous entries
    /// and are reported together in [`PricingError::Unresolved`].
    pub async fn fetch_and_update_usd_prices(&self) -> Result<(), PricingError> {
        let _refresh = self.refresh_lock.lock().await;

        let natives: Vec<NativeAsset> = native_assets(self.registry.as_ref())
            .into_iter()
            .filter(|n| !self.is_reference(n.chain_id, &n.asset))
            .collect();
        let expected: Vec<(ChainId, String)> = natives
            .iter()
            .map(|n| (n.chain_id, n.asset.clone()))
            .collect();

        let (fetched, reference_attempts) = future::join(
            self.sources.fetch_usd_prices(&expected),
            self.sources.fetch_reference_price(),
        )
        .await;

        let outcome = self.commit(&natives, &fetched, &reference_attempts).await?;

        for (chain_id, asset, price) in &outcome.live {
            metrics::set_usd_price(
                &chain_id.to_string(),
                asset,
                price.to_f64().unwrap_or_default(),
            );
        }
        metrics::set_asset_health(outcome.stale, outcome.unresolved.len());

        if outcome.unresolved.is_empty() {
            *self.last_successful_refresh.write().await = Some(Utc::now());
            metrics::record_refresh(true);
            info!(
                priced = outcome.live.len(),
                stale = outcome.stale,
                "Price refresh complete"
            );
            Ok(())
        } else {
            metrics::record_refresh(false);
            for asset in &outcome.unresolved {
                warn!(
                    chain_id = %asset.chain_id,
                    asset = %asset.asset,
                    reason = %asset.reason,
                    "Asset could not be priced"
                );
            }
            Err(PricingError::Unresolved(outcome.unresolved))
        }
    }

    /// Resolve every asset and apply the result under the cache locks
    async fn commit(
        &self,
        natives: &[NativeAsset],
        fetched: &[SourcePrices],
        reference_attempts: &[ReferencePrice],
    ) -> Result<RefreshOutcome, PricingError> {
        let mut min_amounts = self.min_amounts_for_api.write().await;
        let mut prices = self.prices.write().await;
        let mut nft_fees = self.nft_fees.write().await;

        let mut outcome = RefreshOutcome::default();
        let mut staged: Vec<PriceGroup> = Vec::new();

        for native in natives {
            let candidates = Candidates {
                sources: fetched
                    .iter()
                    .map(|s| {
                        s.price_for(native.chain_id, &native.asset)
                            .map(|price| (price.clone(), s.source.clone()))
                    })
                    .collect(),
                cached: cached_entry(&prices, native.chain_id, &native.asset),
                has_default: self.has_default(native),
            };
            let resolution = candidates.resolve(native.chain_id, &native.asset);
            if let Some(group) = self.stage(native, resolution, &mut outcome)? {
                staged.push(group);
            }
        }

        let reference_price = match self
            .registry
            .fungible_native_asset(self.reference_chain_id, &self.reference_asset)
        {
            Some(native) => {
                let candidates = Candidates {
                    sources: reference_attempts.iter().map(reference_candidate).collect(),
                    cached: cached_entry(&prices, native.chain_id, &native.asset),
                    has_default: self.has_default(&native),
                };
                let resolution = candidates.resolve(native.chain_id, &native.asset);
                let price = resolution.as_ref().ok().and_then(|r| r.price().cloned());
                if let Some(group) = self.stage(&native, resolution, &mut outcome)? {
                    staged.push(group);
                }
                price
            }
            None => {
                outcome.unresolved.push(UnresolvedAsset {
                    chain_id: self.reference_chain_id,
                    asset: self.reference_asset.clone(),
                    reason: "reference asset is not registered as native".to_string(),
                });
                None
            }
        };

        for (chain_id, asset, info) in staged.into_iter().flatten() {
            prices.entry(chain_id).or_default().insert(asset, info);
        }

        let mut view: ChainAssetMap<String> = seeded_map(&self.registry.network_ids());
        for (chain_id, assets) in prices.iter() {
            let entry = view.entry(*chain_id).or_default();
            for (asset, info) in assets {
                entry.insert(asset.clone(), info.min_amount_with_fee.to_string());
            }
        }
        *min_amounts = view;

        match reference_price {
            Some(price) => {
                nft_fees.recompute(&self.nft_policies, &price, self.reference_decimals);
                debug!(reference_price = %price, "Recomputed NFT fees");
            }
            None => warn!("No reference price, NFT fees not recomputed"),
        }
        for asset in nft_fees.uncomputed(&self.nft_policies) {
            outcome.unresolved.push(UnresolvedAsset {
                chain_id: self.reference_chain_id,
                asset: asset.clone(),
                reason: "no reference price to convert the USD fee".to_string(),
            });
        }

        Ok(outcome)
    }

    /// Turn a resolution into the entries to write.
    ///
    /// `None` means nothing is written: the previous entries are kept.
    fn stage(
        &self,
        native: &NativeAsset,
        resolution: Result<Resolution, UnresolvedAsset>,
        outcome: &mut RefreshOutcome,
    ) -> Result<Option<PriceGroup>, PricingError> {
        let resolution = match resolution {
            Ok(resolution) => resolution,
            Err(unresolved) => {
                outcome.unresolved.push(unresolved);
                return Ok(None);
            }
        };

        if resolution.is_stale() {
            outcome.stale += 1;
        }
        match &resolution {
            Resolution::Live { price, source } => {
                debug!(
                    chain_id = %native.chain_id,
                    asset = %native.asset,
                    %price,
                    source = %source,
                    "Resolved USD price"
                );
            }
            Resolution::Cached { .. } => {
                warn!(
                    chain_id = %native.chain_id,
                    asset = %native.asset,
                    "No fresh price, keeping cached entries"
                );
                return Ok(None);
            }
            Resolution::StaticDefault => {
                warn!(
                    chain_id = %native.chain_id,
                    asset = %native.asset,
                    "No fresh price, serving default minimum"
                );
            }
        }

        let native_decimals = match self.decimals_of(native.chain_id, &native.asset) {
            Ok(decimals) => decimals,
            Err(unresolved) => {
                outcome.unresolved.push(unresolved);
                return Ok(None);
            }
        };

        // A zero floor means a zero minimum with or without a price
        let zero_floor = native
            .min_fee_amount_in_usd
            .as_ref()
            .is_some_and(|fee| fee.is_zero());

        let mut group = PriceGroup::new();
        for (chain_id, asset) in self.group_members(native) {
            let decimals = match self.decimals_of(chain_id, &asset) {
                Ok(decimals) => decimals,
                Err(unresolved) => {
                    // Never write part of a group
                    outcome.unresolved.push(unresolved);
                    return Ok(None);
                }
            };
            let default = self.default_for(native, native_decimals, chain_id, &asset, decimals);

            let info = match resolution.price() {
                Some(price) => {
                    let default = default.unwrap_or_default();
                    TokenPriceInfo {
                        usd_price: Some(price.clone()),
                        min_amount_with_fee: calculate_min_amount_with_fee(
                            native, decimals, price, &default,
                        )?,
                        default_min_amount: default,
                    }
                }
                None => match default {
                    Some(default) if zero_floor => TokenPriceInfo {
                        usd_price: None,
                        min_amount_with_fee: BigInt::zero(),
                        default_min_amount: default,
                    },
                    Some(default) => TokenPriceInfo::from_default(default),
                    None => {
                        outcome.unresolved.push(UnresolvedAsset {
                            chain_id,
                            asset,
                            reason: "no default minimum configured".to_string(),
                        });
                        return Ok(None);
                    }
                },
            };
            group.push((chain_id, asset, info));
        }

        if let Resolution::Live { price, .. } = resolution {
            outcome
                .live
                .push((native.chain_id, native.asset.clone(), price));
        }
        Ok(Some(group))
    }

    /// The native asset followed by its wrapped form on every other chain
    fn group_members(&self, native: &NativeAsset) -> Vec<(ChainId, String)> {
        let mut members = vec![(native.chain_id, native.asset.clone())];
        for chain_id in self.registry.network_ids() {
            if chain_id == native.chain_id {
                continue;
            }
            if let Some(wrapped) =
                self.registry
                    .native_to_wrapped(&native.asset, native.chain_id, chain_id)
            {
                members.push((chain_id, wrapped));
            }
        }
        members
    }

    fn decimals_of(&self, chain_id: ChainId, asset: &str) -> Result<u8, UnresolvedAsset> {
        self.registry
            .fungible_asset_info(chain_id, asset)
            .map(|info| info.decimals)
            .ok_or_else(|| UnresolvedAsset {
                chain_id,
                asset: asset.to_string(),
                reason: "asset is missing from the registry".to_string(),
            })
    }

    /// Configured default of the asset, or the native default rescaled to the
    /// asset's decimals
    fn default_for(
        &self,
        native: &NativeAsset,
        native_decimals: u8,
        chain_id: ChainId,
        asset: &str,
        decimals: u8,
    ) -> Option<BigInt> {
        self.registry
            .default_min_amount(chain_id, asset)
            .or_else(|| {
                self.registry
                    .default_min_amount(native.chain_id, &native.asset)
                    .map(|amount| to_target_amount(native_decimals, decimals, &amount))
            })
    }

    fn has_default(&self, native: &NativeAsset) -> bool {
        self.registry
            .default_min_amount(native.chain_id, &native.asset)
            .is_some()
    }

    fn is_reference(&self, chain_id: ChainId, asset: &str) -> bool {
        chain_id == self.reference_chain_id && asset == self.reference_asset
    }
}

/// Native fungible assets in a stable order
fn native_assets(registry: &dyn AssetRegistry) -> Vec<NativeAsset> {
    let mut natives: Vec<NativeAsset> = registry
        .fungible_native_assets()
        .into_iter()
        .flat_map(|(chain_id, assets)| {
            assets
                .into_iter()
                .filter_map(move |asset| registry.fungible_native_asset(chain_id, &asset))
        })
        .collect();
    natives.sort_by(|a, b| (a.chain_id, &a.asset).cmp(&(b.chain_id, &b.asset)));
    natives
}

fn cached_entry<'a>(
    prices: &'a ChainAssetMap<TokenPriceInfo>,
    chain_id: ChainId,
    asset: &str,
) -> Option<&'a TokenPriceInfo> {
    prices.get(&chain_id).and_then(|assets| assets.get(asset))
}

fn reference_candidate(attempt: &ReferencePrice) -> Result<(BigDecimal, String), String> {
    match &attempt.price {
        Ok(price) if price.is_positive() => Ok((price.clone(), attempt.source.clone())),
        Ok(price) => Err(format!(
            "{} returned non-positive reference price {}",
            attempt.source, price
        )),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets_file(json: &str) -> AssetsFile {
        serde_json::from_str(json).unwrap()
    }

    fn with_nfts(nfts: &str) -> AssetsFile {
        assets_file(&format!(
            r#"{{
                "reference_asset": {{ "chain_id": 296, "asset": "HBAR" }},
                "networks": [
                    {{
                        "chain_id": 296,
                        "fungible": [{{
                            "asset": "HBAR", "name": "Hbar", "symbol": "HBAR", "decimals": 8,
                            "fee_percentage": 1000
                        }}],
                        "non_fungible": {}
                    }}
                ]
            }}"#,
            nfts
        ))
    }

    #[test]
    fn test_settings_collect_nft_policies() {
        let file = with_nfts(
            r#"[
                { "asset": "0.0.1", "name": "A", "symbol": "A", "fee_in_usd": "5" },
                { "asset": "0.0.2", "name": "B", "symbol": "B", "fee": 1000 },
                { "asset": "0.0.3", "name": "C", "symbol": "C" }
            ]"#,
        );
        let settings = PricingSettings::from_assets_file(&file).unwrap();
        assert_eq!(settings.reference_chain_id, ChainId(296));
        assert_eq!(settings.reference_asset, "HBAR");
        assert_eq!(settings.nft_fees.len(), 2);
        assert_eq!(
            settings.nft_fees["0.0.1"],
            NftFeePolicy::Usd(BigDecimal::from(5))
        );
        assert_eq!(settings.nft_fees["0.0.2"], NftFeePolicy::Constant(1000));
    }

    #[test]
    fn test_settings_reject_both_fees() {
        let file = with_nfts(
            r#"[{ "asset": "0.0.1", "name": "A", "symbol": "A", "fee": 1, "fee_in_usd": "5" }]"#,
        );
        assert!(PricingSettings::from_assets_file(&file).is_err());
    }

    #[test]
    fn test_settings_reject_negative_fees() {
        let file = with_nfts(r#"[{ "asset": "0.0.1", "name": "A", "symbol": "A", "fee": -1 }]"#);
        assert!(PricingSettings::from_assets_file(&file).is_err());

        let file =
            with_nfts(r#"[{ "asset": "0.0.1", "name": "A", "symbol": "A", "fee_in_usd": "-2" }]"#);
        assert!(PricingSettings::from_assets_file(&file).is_err());
    }

    #[test]
    fn test_reference_candidate() {
        let ok = ReferencePrice {
            source: "primary".to_string(),
            price: Ok(BigDecimal::from(2)),
        };
        assert_eq!(
            reference_candidate(&ok),
            Ok((BigDecimal::from(2), "primary".to_string()))
        );

        let zero = ReferencePrice {
            source: "primary".to_string(),
            price: Ok(BigDecimal::from(0)),
        };
        assert!(reference_candidate(&zero).is_err());
    }
}
