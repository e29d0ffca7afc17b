//! NFT fees paid in the reference asset
//!
//! A native NFT on the reference chain either has a constant fee (smallest
//! units of the reference asset) or a USD fee that is converted at the latest
//! reference price on every refresh.

use bigdecimal::BigDecimal;
use num_traits::{Signed, ToPrimitive};
use std::collections::HashMap;

use crate::decimal::to_lowest_denomination;

/// Fee configuration of one native NFT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NftFeePolicy {
    /// Fixed fee, never recomputed
    Constant(i64),
    /// USD fee, recomputed from the reference price
    Usd(BigDecimal),
}

/// `usd_fee / reference_price` in the reference asset's smallest unit.
///
/// Saturates at the `i64` bounds. `reference_price` must be positive.
pub fn dynamic_fee(usd_fee: &BigDecimal, reference_price: &BigDecimal, reference_decimals: u8) -> i64 {
    let amount = to_lowest_denomination(&(usd_fee / reference_price), reference_decimals);
    amount.to_i64().unwrap_or(if amount.is_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Current and previous fee per NFT asset
#[derive(Debug, Default, Clone)]
pub struct NftFeeCache {
    current: HashMap<String, i64>,
    previous: HashMap<String, i64>,
}

impl NftFeeCache {
    /// Cache with constant fees already in place
    pub fn new(policies: &HashMap<String, NftFeePolicy>) -> Self {
        let mut cache = Self::default();
        for (asset, policy) in policies {
            if let NftFeePolicy::Constant(fee) = policy {
                cache.current.insert(asset.clone(), *fee);
                cache.previous.insert(asset.clone(), *fee);
            }
        }
        cache
    }

    pub fn current(&self, asset: &str) -> Option<i64> {
        self.current.get(asset).copied()
    }

    pub fn previous(&self, asset: &str) -> Option<i64> {
        self.previous.get(asset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.current.iter()
    }

    /// Recompute every USD fee at `reference_price`.
    ///
    /// The fee being replaced moves to `previous`. On the first computation
    /// there is nothing to replace and `previous` takes the new value.
    pub fn recompute(
        &mut self,
        policies: &HashMap<String, NftFeePolicy>,
        reference_price: &BigDecimal,
        reference_decimals: u8,
    ) {
        for (asset, policy) in policies {
            let NftFeePolicy::Usd(usd_fee) = policy else {
                continue;
            };

            let fee = dynamic_fee(usd_fee, reference_price, reference_decimals);
            let previous = self.current.insert(asset.clone(), fee).unwrap_or(fee);
            self.previous.insert(asset.clone(), previous);
        }
    }

    /// USD-priced assets that have never been computed
    pub fn uncomputed<'a>(&self, policies: &'a HashMap<String, NftFeePolicy>) -> Vec<&'a String> {
        policies
            .iter()
            .filter(|(asset, policy)| {
                matches!(policy, NftFeePolicy::Usd(_)) && !self.current.contains_key(*asset)
            })
            .map(|(asset, _)| asset)
            .collect()
    }
}
