//! Asset registry
//!
//! Maps native assets to their wrapped representations across chains and
//! supplies per-asset metadata. The pricing service only reads from it.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Signed;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::config::AssetsFile;
use crate::error::PricingError;
use crate::types::{
    ChainId, FungibleAssetInfo, NativeAsset, NonFungibleAssetInfo, FEE_MAX_PERCENTAGE,
};

/// Read-only view of the bridge's asset catalogue
pub trait AssetRegistry: Send + Sync {
    /// Every chain the bridge is configured for
    fn network_ids(&self) -> Vec<ChainId>;

    /// Native fungible assets per chain
    fn fungible_native_assets(&self) -> HashMap<ChainId, Vec<String>>;

    fn fungible_asset_info(&self, chain_id: ChainId, asset: &str) -> Option<FungibleAssetInfo>;

    fn non_fungible_asset_info(
        &self,
        chain_id: ChainId,
        asset: &str,
    ) -> Option<NonFungibleAssetInfo>;

    /// Native counterpart of a native or wrapped fungible asset
    fn fungible_native_asset(&self, chain_id: ChainId, asset: &str) -> Option<NativeAsset>;

    /// Wrapped form of `asset` on `target_chain_id`, if one exists
    fn native_to_wrapped(
        &self,
        asset: &str,
        native_chain_id: ChainId,
        target_chain_id: ChainId,
    ) -> Option<String>;

    /// Non-fungible assets per chain, native and wrapped
    fn non_fungible_network_assets(&self) -> HashMap<ChainId, Vec<String>>;

    /// Statically configured minimum amount for a (chain, asset) pair
    fn default_min_amount(&self, chain_id: ChainId, asset: &str) -> Option<BigInt>;
}

type AssetKey = (ChainId, String);

/// Registry backed by the asset catalogue file
#[derive(Debug, Default)]
pub struct StaticAssetRegistry {
    networks: Vec<ChainId>,
    fungible: HashMap<AssetKey, FungibleAssetInfo>,
    natives: HashMap<AssetKey, NativeAsset>,
    native_of: HashMap<AssetKey, AssetKey>,
    wrapped: HashMap<AssetKey, HashMap<ChainId, String>>,
    native_by_chain: HashMap<ChainId, Vec<String>>,
    non_fungible: HashMap<AssetKey, NonFungibleAssetInfo>,
    non_fungible_by_chain: HashMap<ChainId, Vec<String>>,
    min_amounts: HashMap<AssetKey, BigInt>,
}

impl StaticAssetRegistry {
    /// Build and validate the registry.
    ///
    /// Configuration errors (zero fee percentage, unknown chains, duplicate
    /// assets, unparsable amounts) are fatal.
    pub fn from_assets_file(file: &AssetsFile) -> Result<Self, PricingError> {
        let mut registry = Self::default();

        let mut seen_chains = HashSet::new();
        for network in &file.networks {
            if !seen_chains.insert(network.chain_id) {
                return Err(PricingError::Config(format!(
                    "network {} is listed twice",
                    network.chain_id
                )));
            }
            registry.networks.push(ChainId(network.chain_id));
        }

        for network in &file.networks {
            let chain_id = ChainId(network.chain_id);

            for asset in &network.fungible {
                let key = (chain_id, asset.asset.clone());
                registry.ensure_unique_fungible(&key)?;

                if asset.fee_percentage == 0 || asset.fee_percentage > FEE_MAX_PERCENTAGE {
                    return Err(PricingError::Config(format!(
                        "fee_percentage for {} on chain {} must be in 1..={} (got {})",
                        asset.asset, chain_id, FEE_MAX_PERCENTAGE, asset.fee_percentage
                    )));
                }

                let min_fee_amount_in_usd = asset
                    .min_fee_amount_in_usd
                    .as_deref()
                    .map(|v| parse_decimal(v, "min_fee_amount_in_usd", &key))
                    .transpose()?;
                if min_fee_amount_in_usd.as_ref().is_some_and(|v| v.is_negative()) {
                    return Err(PricingError::Config(format!(
                        "min_fee_amount_in_usd for {} on chain {} is negative",
                        asset.asset, chain_id
                    )));
                }

                registry.natives.insert(
                    key.clone(),
                    NativeAsset {
                        chain_id,
                        asset: asset.asset.clone(),
                        min_fee_amount_in_usd,
                        fee_percentage: asset.fee_percentage,
                    },
                );
                registry.fungible.insert(
                    key.clone(),
                    FungibleAssetInfo {
                        name: asset.name.clone(),
                        symbol: asset.symbol.clone(),
                        decimals: asset.decimals,
                        is_native: true,
                        reserve_amount: parse_optional_amount(
                            asset.reserve_amount.as_deref(),
                            "reserve_amount",
                            &key,
                        )?
                        .unwrap_or_default(),
                    },
                );
                if let Some(min) =
                    parse_optional_amount(asset.min_amount.as_deref(), "min_amount", &key)?
                {
                    registry.min_amounts.insert(key.clone(), min);
                }
                registry.native_of.insert(key.clone(), key.clone());
                registry
                    .native_by_chain
                    .entry(chain_id)
                    .or_default()
                    .push(asset.asset.clone());

                let mut targets = HashMap::new();
                for wrapped in &asset.wrapped {
                    let target = ChainId(wrapped.chain_id);
                    registry.ensure_known_chain(target, &asset.asset)?;
                    if target == chain_id {
                        return Err(PricingError::Config(format!(
                            "{} is wrapped on its own native chain {}",
                            asset.asset, chain_id
                        )));
                    }

                    let wrapped_key = (target, wrapped.asset.clone());
                    registry.ensure_unique_fungible(&wrapped_key)?;
                    registry.fungible.insert(
                        wrapped_key.clone(),
                        FungibleAssetInfo {
                            name: wrapped.name.clone(),
                            symbol: wrapped.symbol.clone(),
                            decimals: wrapped.decimals,
                            is_native: false,
                            reserve_amount: BigInt::default(),
                        },
                    );
                    if let Some(min) = parse_optional_amount(
                        wrapped.min_amount.as_deref(),
                        "min_amount",
                        &wrapped_key,
                    )? {
                        registry.min_amounts.insert(wrapped_key.clone(), min);
                    }
                    registry.native_of.insert(wrapped_key, key.clone());
                    targets.insert(target, wrapped.asset.clone());
                }
                registry.wrapped.insert(key, targets);
            }

            for nft in &network.non_fungible {
                let key = (chain_id, nft.asset.clone());
                if registry.non_fungible.contains_key(&key) {
                    return Err(PricingError::Config(format!(
                        "non-fungible asset {} on chain {} is listed twice",
                        nft.asset, chain_id
                    )));
                }
                registry.non_fungible.insert(
                    key,
                    NonFungibleAssetInfo {
                        name: nft.name.clone(),
                        symbol: nft.symbol.clone(),
                        is_native: true,
                        reserve_amount: BigInt::default(),
                    },
                );
                registry
                    .non_fungible_by_chain
                    .entry(chain_id)
                    .or_default()
                    .push(nft.asset.clone());

                for wrapped in &nft.wrapped {
                    let target = ChainId(wrapped.chain_id);
                    registry.ensure_known_chain(target, &nft.asset)?;
                    registry.non_fungible.insert(
                        (target, wrapped.asset.clone()),
                        NonFungibleAssetInfo {
                            name: wrapped.name.clone(),
                            symbol: wrapped.symbol.clone(),
                            is_native: false,
                            reserve_amount: BigInt::default(),
                        },
                    );
                    registry
                        .non_fungible_by_chain
                        .entry(target)
                        .or_default()
                        .push(wrapped.asset.clone());
                }
            }
        }

        let reference = ChainId(file.reference_asset.chain_id);
        if !registry
            .natives
            .contains_key(&(reference, file.reference_asset.asset.clone()))
        {
            return Err(PricingError::Config(format!(
                "reference asset {} is not a native fungible asset of chain {}",
                file.reference_asset.asset, reference
            )));
        }

        Ok(registry)
    }

    fn ensure_known_chain(&self, chain_id: ChainId, asset: &str) -> Result<(), PricingError> {
        if self.networks.contains(&chain_id) {
            Ok(())
        } else {
            Err(PricingError::Config(format!(
                "{} is wrapped on unknown chain {}",
                asset, chain_id
            )))
        }
    }

    fn ensure_unique_fungible(&self, key: &AssetKey) -> Result<(), PricingError> {
        if self.fungible.contains_key(key) {
            Err(PricingError::Config(format!(
                "fungible asset {} on chain {} is listed twice",
                key.1, key.0
            )))
        } else {
            Ok(())
        }
    }
}

fn parse_decimal(value: &str, field: &str, key: &AssetKey) -> Result<BigDecimal, PricingError> {
    BigDecimal::from_str(value.trim()).map_err(|e| {
        PricingError::Config(format!(
            "{} for {} on chain {} is not a decimal ({}): {}",
            field, key.1, key.0, value, e
        ))
    })
}

fn parse_optional_amount(
    value: Option<&str>,
    field: &str,
    key: &AssetKey,
) -> Result<Option<BigInt>, PricingError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let amount = BigInt::from_str(value.trim()).map_err(|e| {
        PricingError::Config(format!(
            "{} for {} on chain {} is not an integer ({}): {}",
            field, key.1, key.0, value, e
        ))
    })?;
    if amount.is_negative() {
        return Err(PricingError::Config(format!(
            "{} for {} on chain {} is negative",
            field, key.1, key.0
        )));
    }
    Ok(Some(amount))
}

impl AssetRegistry for StaticAssetRegistry {
    fn network_ids(&self) -> Vec<ChainId> {
        self.networks.clone()
    }

    fn fungible_native_assets(&self) -> HashMap<ChainId, Vec<String>> {
        self.native_by_chain.clone()
    }

    fn fungible_asset_info(&self, chain_id: ChainId, asset: &str) -> Option<FungibleAssetInfo> {
        self.fungible.get(&(chain_id, asset.to_string())).cloned()
    }

    fn non_fungible_asset_info(
        &self,
        chain_id: ChainId,
        asset: &str,
    ) -> Option<NonFungibleAssetInfo> {
        self.non_fungible.get(&(chain_id, asset.to_string())).cloned()
    }

    fn fungible_native_asset(&self, chain_id: ChainId, asset: &str) -> Option<NativeAsset> {
        self.native_of
            .get(&(chain_id, asset.to_string()))
            .and_then(|native_key| self.natives.get(native_key))
            .cloned()
    }

    fn native_to_wrapped(
        &self,
        asset: &str,
        native_chain_id: ChainId,
        target_chain_id: ChainId,
    ) -> Option<String> {
        self.wrapped
            .get(&(native_chain_id, asset.to_string()))
            .and_then(|targets| targets.get(&target_chain_id))
            .cloned()
    }

    fn non_fungible_network_assets(&self) -> HashMap<ChainId, Vec<String>> {
        self.non_fungible_by_chain.clone()
    }

    fn default_min_amount(&self, chain_id: ChainId, asset: &str) -> Option<BigInt> {
        self.min_amounts.get(&(chain_id, asset.to_string())).cloned()
    }
}
