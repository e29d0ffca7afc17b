//! Price resolution chain
//!
//! A native asset is priced by trying, in order: every queried price source,
//! the cached entry, the statically configured default minimum. The first
//! strategy that yields a value wins; if none does the asset is unresolved.

use bigdecimal::BigDecimal;

use crate::error::UnresolvedAsset;
use crate::types::{ChainId, TokenPriceInfo};

/// How a native asset (and its wrapped forms) is served after a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Fresh positive price from a source
    Live { price: BigDecimal, source: String },
    /// Existing cache entries stay untouched. `price` is the cached USD price
    /// if the entry was ever live.
    Cached { price: Option<BigDecimal> },
    /// Serve static default minimums
    StaticDefault,
}

impl Resolution {
    /// Anything but a fresh source price
    pub fn is_stale(&self) -> bool {
        !matches!(self, Resolution::Live { .. })
    }

    /// Price to compute with, fresh or cached
    pub fn price(&self) -> Option<&BigDecimal> {
        match self {
            Resolution::Live { price, .. } => Some(price),
            Resolution::Cached { price } => price.as_ref(),
            Resolution::StaticDefault => None,
        }
    }
}

/// One link of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// The n-th queried source
    Source(usize),
    Cached,
    StaticDefault,
}

enum Step {
    Resolved(Resolution),
    Next(String),
}

/// Inputs for resolving one native asset
pub struct Candidates<'a> {
    /// Per-source outcome in query order: `(price, source name)` or the reason
    /// the source could not price the asset
    pub sources: Vec<Result<(BigDecimal, String), String>>,
    pub cached: Option<&'a TokenPriceInfo>,
    pub has_default: bool,
}

impl<'a> Candidates<'a> {
    fn strategies(&self) -> impl Iterator<Item = Strategy> {
        (0..self.sources.len())
            .map(Strategy::Source)
            .chain([Strategy::Cached, Strategy::StaticDefault])
    }

    fn attempt(&self, strategy: Strategy) -> Step {
        match strategy {
            Strategy::Source(i) => match &self.sources[i] {
                Ok((price, source)) => Step::Resolved(Resolution::Live {
                    price: price.clone(),
                    source: source.clone(),
                }),
                Err(reason) => Step::Next(reason.clone()),
            },
            Strategy::Cached => match self.cached {
                Some(info) => Step::Resolved(Resolution::Cached {
                    price: info.usd_price.clone(),
                }),
                None => Step::Next("no cached entry".to_string()),
            },
            Strategy::StaticDefault => {
                if self.has_default {
                    Step::Resolved(Resolution::StaticDefault)
                } else {
                    Step::Next("no default minimum configured".to_string())
                }
            }
        }
    }

    /// Walk the chain and return the first resolution
    pub fn resolve(&self, chain_id: ChainId, asset: &str) -> Result<Resolution, UnresolvedAsset> {
        let mut reasons = Vec::new();
        for strategy in self.strategies() {
            match self.attempt(strategy) {
                Step::Resolved(resolution) => return Ok(resolution),
                Step::Next(reason) => reasons.push(reason),
            }
        }

        Err(UnresolvedAsset {
            chain_id,
            asset: asset.to_string(),
            reason: reasons.join("; "),
        })
    }
}
