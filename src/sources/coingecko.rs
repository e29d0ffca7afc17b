//! CoinGecko simple-price adapter (primary source)

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

use super::{parse_usd, prices_by_asset, unique_ids, PriceSource};
use crate::error::SourceError;
use crate::types::{ChainPrices, ProviderIds};

const NAME: &str = "coingecko";

pub struct CoinGeckoSource {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    /// CoinGecko id of the reference asset (e.g. "hedera-hashgraph")
    reference_id: String,
}

impl CoinGeckoSource {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        reference_id: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| http_error(&e))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            reference_id: reference_id.to_string(),
        })
    }

    /// `GET /simple/price?ids=..&vs_currencies=usd`
    async fn simple_price(&self, ids: &[String]) -> Result<Value, SourceError> {
        let url = format!("{}/simple/price", self.api_url);
        let mut request = self.client.get(&url).query(&[
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("precision", "full".to_string()),
        ]);
        if let Some(ref key) = self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }

        let response = request.send().await.map_err(|e| http_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                source_name: NAME.to_string(),
                message: format!("status {}", status),
            });
        }

        let body: Value = response.json().await.map_err(|e| SourceError::Malformed {
            source_name: NAME.to_string(),
            message: e.to_string(),
        })?;
        trace!(response = %body, "CoinGecko response");
        Ok(body)
    }
}

fn http_error(e: &reqwest::Error) -> SourceError {
    SourceError::Http {
        source_name: NAME.to_string(),
        message: e.to_string(),
    }
}

/// USD price of `id` in a simple-price response: `{"<id>": {"usd": 0.07}}`
fn usd_price_of(body: &Value, id: &str) -> Option<BigDecimal> {
    body.get(id).and_then(|v| v.get("usd")).and_then(parse_usd)
}

fn ensure_object(body: &Value) -> Result<(), SourceError> {
    if body.is_object() {
        Ok(())
    } else {
        Err(SourceError::Malformed {
            source_name: NAME.to_string(),
            message: "expected a JSON object".to_string(),
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn usd_prices(&self, ids: &ProviderIds) -> Result<ChainPrices, SourceError> {
        let query_ids = unique_ids(ids);
        if query_ids.is_empty() {
            return Ok(ChainPrices::new());
        }

        let body = self.simple_price(&query_ids).await?;
        ensure_object(&body)?;
        Ok(prices_by_asset(ids, |id| usd_price_of(&body, id)))
    }

    async fn reference_asset_usd_price(&self) -> Result<BigDecimal, SourceError> {
        let body = self
            .simple_price(std::slice::from_ref(&self.reference_id))
            .await?;
        ensure_object(&body)?;
        usd_price_of(&body, &self.reference_id).ok_or_else(|| SourceError::MissingPrice {
            source_name: NAME.to_string(),
            id: self.reference_id.clone(),
        })
    }
}
