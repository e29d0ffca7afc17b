//! CL8Y Bridge Pricing - Library interface
//!
//! Cross-chain USD price and minimum transfer amount cache, with NFT fees
//! priced in the reference asset.

pub mod api;
pub mod config;
pub mod decimal;
pub mod error;
pub mod fees;
pub mod metrics;
pub mod pricing;
pub mod registry;
pub mod scheduler;
pub mod sources;
pub mod types;

pub use error::PricingError;
pub use pricing::{PricingService, PricingSettings};
