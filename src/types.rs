//! Common types for cross-chain pricing
//!
//! Asset descriptors supplied by the asset registry and the cached records
//! produced by the pricing service.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Denominator of the scaled fee percentage.
///
/// A fee percentage of 10_000 is 10%, 1_000 is 1%.
pub const FEE_MAX_PERCENTAGE: u64 = 100_000;

/// Native chain identifier (EVM chain id or ledger network id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// Per-chain, per-asset map
pub type ChainAssetMap<T> = HashMap<ChainId, HashMap<String, T>>;

/// USD prices returned by a price source
pub type ChainPrices = ChainAssetMap<BigDecimal>;

/// Provider-specific price ids (e.g. CoinGecko slug, CoinMarketCap numeric id)
pub type ProviderIds = ChainAssetMap<String>;

/// Canonical (non-wrapped) asset with its fee policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAsset {
    pub chain_id: ChainId,
    pub asset: String,
    /// USD floor a transfer must cover. `None` means no fee floor.
    pub min_fee_amount_in_usd: Option<BigDecimal>,
    /// Scaled fee rate, see [`FEE_MAX_PERCENTAGE`]
    pub fee_percentage: u64,
}

/// Static metadata of a fungible asset on a given chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FungibleAssetInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub is_native: bool,
    pub reserve_amount: BigInt,
}

/// Static metadata of a non-fungible asset on a given chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonFungibleAssetInfo {
    pub name: String,
    pub symbol: String,
    pub is_native: bool,
    pub reserve_amount: BigInt,
}

/// Cached pricing record for one (chain, asset) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPriceInfo {
    /// Latest USD price of the native counterpart.
    /// `None` when the entry only serves a static default minimum.
    pub usd_price: Option<BigDecimal>,
    /// Minimum transfer amount in the asset's smallest unit, fee included
    pub min_amount_with_fee: BigInt,
    /// Statically configured minimum used when live pricing is unavailable
    pub default_min_amount: BigInt,
}

impl TokenPriceInfo {
    /// Entry backed only by the static default minimum
    pub fn from_default(default_min_amount: BigInt) -> Self {
        Self {
            usd_price: None,
            min_amount_with_fee: default_min_amount.clone(),
            default_min_amount,
        }
    }

    pub fn is_live(&self) -> bool {
        self.usd_price.is_some()
    }
}

/// Build a map with an empty entry for every chain.
pub fn seeded_map<T>(chains: &[ChainId]) -> ChainAssetMap<T> {
    chains.iter().map(|c| (*c, HashMap::new())).collect()
}
