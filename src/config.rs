//! Service configuration
//!
//! Runtime settings come from environment variables (optionally via `.env`).
//! The asset catalogue (networks, fungible/non-fungible assets, fee policy and
//! price-provider ids) is a separate file loaded through the `config` crate so
//! it can be JSON, YAML or TOML.

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

use crate::types::{ChainId, ProviderIds};

/// Main configuration for the pricing service
#[derive(Clone)]
pub struct Config {
    /// Path to the asset catalogue file
    pub assets_config_path: String,
    pub refresh_interval_secs: u64,
    /// Upper bound for a single price source call
    pub source_timeout_secs: u64,
    pub coingecko: SourceConfig,
    /// Fallback source. Disabled when no API key is configured.
    pub coinmarketcap: Option<SourceConfig>,
    pub api: ApiConfig,
}

/// Price source endpoint configuration
#[derive(Clone)]
pub struct SourceConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

/// Custom Debug that redacts the API key to prevent accidental log leakage.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("assets_config_path", &self.assets_config_path)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("coingecko", &self.coingecko)
            .field("coinmarketcap", &self.coinmarketcap)
            .field("api", &self.api)
            .finish()
    }
}

/// HTTP API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Default functions
fn default_refresh_interval() -> u64 {
    60
}

fn default_source_timeout() -> u64 {
    10
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_coinmarketcap_url() -> String {
    "https://pro-api.coinmarketcap.com".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9092
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let coingecko = SourceConfig {
            api_url: env::var("COINGECKO_API_URL").unwrap_or_else(|_| default_coingecko_url()),
            api_key: non_empty_var("COINGECKO_API_KEY"),
        };

        let coinmarketcap = non_empty_var("COINMARKETCAP_API_KEY").map(|key| SourceConfig {
            api_url: env::var("COINMARKETCAP_API_URL")
                .unwrap_or_else(|_| default_coinmarketcap_url()),
            api_key: Some(key),
        });

        let config = Config {
            assets_config_path: env::var("ASSETS_CONFIG_PATH")
                .map_err(|_| eyre!("ASSETS_CONFIG_PATH environment variable is required"))?,
            refresh_interval_secs: env::var("REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_refresh_interval()),
            source_timeout_secs: env::var("PRICE_SOURCE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_source_timeout()),
            coingecko,
            coinmarketcap,
            api: ApiConfig {
                bind_address: env::var("API_BIND_ADDRESS")
                    .unwrap_or_else(|_| default_bind_address()),
                port: env::var("API_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default_api_port()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.assets_config_path.is_empty() {
            return Err(eyre!("assets_config_path cannot be empty"));
        }

        if self.refresh_interval_secs == 0 {
            return Err(eyre!("refresh_interval_secs must be greater than zero"));
        }

        // A timeout at or above the refresh interval lets refreshes pile up
        if self.source_timeout_secs == 0 || self.source_timeout_secs >= self.refresh_interval_secs {
            return Err(eyre!(
                "source_timeout_secs must be between 1 and refresh_interval_secs - 1 (got {})",
                self.source_timeout_secs
            ));
        }

        if self.coingecko.api_url.is_empty() {
            return Err(eyre!("coingecko.api_url cannot be empty"));
        }

        if let Some(ref cmc) = self.coinmarketcap {
            if cmc.api_url.is_empty() {
                return Err(eyre!("coinmarketcap.api_url cannot be empty"));
            }
        }

        Ok(())
    }

    /// Read and parse the asset catalogue
    pub fn load_assets(&self) -> Result<AssetsFile> {
        AssetsFile::load(&self.assets_config_path)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Asset catalogue
// ============================================================================

/// Asset catalogue file
///
/// Amounts and USD values are kept as strings so that the file never goes
/// through floating point; they are parsed into `BigInt`/`BigDecimal` when the
/// registry is built.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsFile {
    /// The chain's primary native currency used as the NFT fee basis
    pub reference_asset: ReferenceAssetConfig,
    pub networks: Vec<NetworkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceAssetConfig {
    pub chain_id: u64,
    pub asset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fungible: Vec<FungibleAssetConfig>,
    #[serde(default)]
    pub non_fungible: Vec<NonFungibleAssetConfig>,
}

/// A fungible asset native to the enclosing network
#[derive(Debug, Clone, Deserialize)]
pub struct FungibleAssetConfig {
    pub asset: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub reserve_amount: Option<String>,
    /// USD fee floor, absent for assets without one
    #[serde(default)]
    pub min_fee_amount_in_usd: Option<String>,
    pub fee_percentage: u64,
    /// Static minimum in smallest units, served when no price is available
    #[serde(default)]
    pub min_amount: Option<String>,
    #[serde(default)]
    pub price_ids: PriceIdsConfig,
    #[serde(default)]
    pub wrapped: Vec<WrappedFungibleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceIdsConfig {
    #[serde(default)]
    pub coingecko: Option<String>,
    #[serde(default)]
    pub coinmarketcap: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappedFungibleConfig {
    pub chain_id: u64,
    pub asset: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub min_amount: Option<String>,
}

/// A non-fungible asset native to the enclosing network
#[derive(Debug, Clone, Deserialize)]
pub struct NonFungibleAssetConfig {
    pub asset: String,
    pub name: String,
    pub symbol: String,
    /// Constant fee in smallest units of the reference asset
    #[serde(default)]
    pub fee: Option<i64>,
    /// USD fee, converted to the reference asset on every refresh
    #[serde(default)]
    pub fee_in_usd: Option<String>,
    #[serde(default)]
    pub wrapped: Vec<WrappedNonFungibleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappedNonFungibleConfig {
    pub chain_id: u64,
    pub asset: String,
    pub name: String,
    pub symbol: String,
}

impl AssetsFile {
    /// Load from a JSON, YAML or TOML file (format picked from the extension)
    pub fn load(path: &str) -> Result<Self> {
        ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .build()
            .wrap_err_with(|| format!("Failed to read assets file {}", path))?
            .try_deserialize()
            .wrap_err_with(|| format!("Failed to parse assets file {}", path))
    }

    /// Provider ids of every native fungible asset, as picked by `pick`.
    /// Assets without an id for that provider are left out.
    pub fn provider_ids<F>(&self, pick: F) -> ProviderIds
    where
        F: Fn(&PriceIdsConfig) -> Option<&String>,
    {
        let mut ids = ProviderIds::new();
        for network in &self.networks {
            for asset in &network.fungible {
                if let Some(id) = pick(&asset.price_ids) {
                    ids.entry(ChainId(network.chain_id))
                        .or_default()
                        .insert(asset.asset.clone(), id.clone());
                }
            }
        }
        ids
    }

    /// Price ids of the reference asset
    pub fn reference_price_ids(&self) -> Option<&PriceIdsConfig> {
        self.networks
            .iter()
            .filter(|n| n.chain_id == self.reference_asset.chain_id)
            .flat_map(|n| n.fungible.iter())
            .find(|a| a.asset == self.reference_asset.asset)
            .map(|a| &a.price_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_config() -> Config {
        Config {
            assets_config_path: "assets.yaml".to_string(),
            refresh_interval_secs: 60,
            source_timeout_secs: 10,
            coingecko: SourceConfig {
                api_url: default_coingecko_url(),
                api_key: None,
            },
            coinmarketcap: Some(SourceConfig {
                api_url: default_coinmarketcap_url(),
                api_key: Some("cmc-secret".to_string()),
            }),
            api: ApiConfig {
                bind_address: default_bind_address(),
                port: default_api_port(),
            },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_refresh_interval(), 60);
        assert_eq!(default_source_timeout(), 10);
        assert_eq!(default_api_port(), 9092);
        assert_eq!(default_bind_address(), "0.0.0.0");
    }

    #[test]
    fn test_validate() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.source_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.source_timeout_secs = 60;
        assert!(config.validate().is_err());

        config.source_timeout_secs = 10;
        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        config.refresh_interval_secs = 60;
        config.coingecko.api_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_keys() {
        let config = test_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("cmc-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        env::set_var("ASSETS_CONFIG_PATH", "/tmp/assets.yaml");
        env::set_var("REFRESH_INTERVAL_SECS", "30");
        env::remove_var("PRICE_SOURCE_TIMEOUT_SECS");
        env::remove_var("COINMARKETCAP_API_KEY");

        let config = Config::load_from_env().unwrap();
        assert_eq!(config.assets_config_path, "/tmp/assets.yaml");
        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(config.source_timeout_secs, 10);
        assert!(config.coinmarketcap.is_none());

        env::set_var("COINMARKETCAP_API_KEY", "abc");
        let config = Config::load_from_env().unwrap();
        assert!(config.coinmarketcap.is_some());

        env::remove_var("ASSETS_CONFIG_PATH");
        env::remove_var("REFRESH_INTERVAL_SECS");
        env::remove_var("COINMARKETCAP_API_KEY");
    }

    #[test]
    #[serial]
    fn test_load_requires_assets_path() {
        env::remove_var("ASSETS_CONFIG_PATH");
        assert!(Config::load_from_env().is_err());
    }

    #[test]
    fn test_load_assets_file_json() {
        let path = env::temp_dir().join(format!("pricing-assets-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "reference_asset": { "chain_id": 296, "asset": "HBAR" },
                "networks": [
                    {
                        "chain_id": 296,
                        "name": "hedera",
                        "fungible": [{
                            "asset": "HBAR",
                            "name": "Hbar",
                            "symbol": "HBAR",
                            "decimals": 8,
                            "min_fee_amount_in_usd": "1",
                            "fee_percentage": 1000,
                            "price_ids": { "coingecko": "hedera-hashgraph", "coinmarketcap": "4642" },
                            "wrapped": [{
                                "chain_id": 1,
                                "asset": "0x0000000000000000000000000000000000000001",
                                "name": "Wrapped Hbar",
                                "symbol": "WHBAR",
                                "decimals": 8
                            }]
                        }]
                    },
                    { "chain_id": 1, "name": "ethereum" }
                ]
            }"#,
        )
        .unwrap();

        let assets = AssetsFile::load(path.to_str().unwrap()).unwrap();
        assert_eq!(assets.reference_asset.chain_id, 296);
        assert_eq!(assets.networks.len(), 2);
        let hbar = &assets.networks[0].fungible[0];
        assert_eq!(hbar.decimals, 8);
        assert_eq!(hbar.price_ids.coingecko.as_deref(), Some("hedera-hashgraph"));
        assert_eq!(hbar.wrapped.len(), 1);
        assert!(assets.networks[1].fungible.is_empty());

        let cmc_ids = assets.provider_ids(|ids| ids.coinmarketcap.as_ref());
        assert_eq!(cmc_ids[&ChainId(296)]["HBAR"], "4642");
        assert_eq!(
            assets
                .reference_price_ids()
                .and_then(|ids| ids.coingecko.as_deref()),
            Some("hedera-hashgraph")
        );

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_example_assets_file_builds_registry() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/assets.example.yaml");
        let assets = AssetsFile::load(path).unwrap();
        assert_eq!(assets.reference_asset.asset, "HBAR");

        let registry = crate::registry::StaticAssetRegistry::from_assets_file(&assets).unwrap();
        let settings = crate::pricing::PricingSettings::from_assets_file(&assets).unwrap();
        assert_eq!(settings.nft_fees.len(), 2);

        use crate::registry::AssetRegistry;
        assert_eq!(
            registry.native_to_wrapped("HBAR", ChainId(296), ChainId(1)),
            Some("0x0000000000000000000000000000000000000101".to_string())
        );
    }
}
