//! Error types for the pricing engine

use std::fmt;
use thiserror::Error;

use crate::types::ChainId;

/// Failure of a single price source call
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{source_name} request failed: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    #[error("{source_name} timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("{source_name} returned a malformed response: {message}")]
    Malformed {
        source_name: String,
        message: String,
    },

    #[error("{source_name} has no price for {id}")]
    MissingPrice { source_name: String, id: String },
}

/// Malformed fee configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("fee percentage for {asset} on chain {chain_id} is zero")]
    ZeroFeePercentage { chain_id: ChainId, asset: String },
}

/// An asset the refresh could not price, cache or default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedAsset {
    pub chain_id: ChainId,
    pub asset: String,
    pub reason: String,
}

impl fmt::Display for UnresolvedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.chain_id, self.asset, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error("no usable price, cache entry or default for {} asset(s): {}", .0.len(), join(.0))]
    Unresolved(Vec<UnresolvedAsset>),
}

fn join(assets: &[UnresolvedAsset]) -> String {
    assets
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message_lists_assets() {
        let err = PricingError::Unresolved(vec![
            UnresolvedAsset {
                chain_id: ChainId(296),
                asset: "HBAR".to_string(),
                reason: "all sources failed".to_string(),
            },
            UnresolvedAsset {
                chain_id: ChainId(1),
                asset: "0xabc".to_string(),
                reason: "zero price".to_string(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 asset(s)"));
        assert!(msg.contains("296/HBAR: all sources failed"));
        assert!(msg.contains("1/0xabc: zero price"));
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Timeout {
            source_name: "coingecko".to_string(),
            secs: 10,
        };
        assert_eq!(err.to_string(), "coingecko timed out after 10s");
    }
}
