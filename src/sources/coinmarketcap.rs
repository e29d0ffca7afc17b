//! CoinMarketCap quotes adapter (fallback source)

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

use super::{parse_usd, prices_by_asset, unique_ids, PriceSource};
use crate::error::SourceError;
use crate::types::{ChainPrices, ProviderIds};

const NAME: &str = "coinmarketcap";

pub struct CoinMarketCapSource {
    client: Client,
    api_url: String,
    api_key: String,
    /// CoinMarketCap numeric id of the reference asset (e.g. "4642")
    reference_id: String,
}

impl CoinMarketCapSource {
    pub fn new(
        api_url: &str,
        api_key: &str,
        reference_id: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http {
                source_name: NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            reference_id: reference_id.to_string(),
        })
    }

    /// `GET /v2/cryptocurrency/quotes/latest?id=..&convert=USD`
    async fn quotes(&self, ids: &[String]) -> Result<Value, SourceError> {
        let url = format!("{}/v2/cryptocurrency/quotes/latest", self.api_url);
        let response = self
            .client
            .get(&url)
            .header("X-CMC_PRO_API_KEY", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("id", ids.join(",")), ("convert", "USD".to_string())])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                source_name: NAME.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| SourceError::Malformed {
            source_name: NAME.to_string(),
            message: e.to_string(),
        })?;
        trace!(response = %body, "CoinMarketCap response");

        check_status(&body)?;
        if !status.is_success() {
            return Err(SourceError::Http {
                source_name: NAME.to_string(),
                message: format!("status {}", status),
            });
        }
        Ok(body)
    }
}

/// Reject responses whose `status.error_code` is non-zero
fn check_status(body: &Value) -> Result<(), SourceError> {
    let status = body.get("status");
    let code = status
        .and_then(|s| s.get("error_code"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if code == 0 {
        return Ok(());
    }

    let message = status
        .and_then(|s| s.get("error_message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(SourceError::Http {
        source_name: NAME.to_string(),
        message: format!("error_code {}: {}", code, message),
    })
}

/// USD price of `id` in a quotes response.
///
/// `data.<id>` is an object for id queries but some plans return an array of
/// candidates; the first entry is used.
fn usd_price_of(body: &Value, id: &str) -> Option<BigDecimal> {
    let entry = body.get("data")?.get(id)?;
    let entry = match entry {
        Value::Array(items) => items.first()?,
        other => other,
    };
    entry
        .get("quote")
        .and_then(|q| q.get("USD"))
        .and_then(|usd| usd.get("price"))
        .and_then(parse_usd)
}

#[async_trait]
impl PriceSource for CoinMarketCapSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn usd_prices(&self, ids: &ProviderIds) -> Result<ChainPrices, SourceError> {
        let query_ids = unique_ids(ids);
        if query_ids.is_empty() {
            return Ok(ChainPrices::new());
        }

        let body = self.quotes(&query_ids).await?;
        if body.get("data").is_none() {
            return Err(SourceError::Malformed {
                source_name: NAME.to_string(),
                message: "missing data field".to_string(),
            });
        }
        Ok(prices_by_asset(ids, |id| usd_price_of(&body, id)))
    }

    async fn reference_asset_usd_price(&self) -> Result<BigDecimal, SourceError> {
        let body = self
            .quotes(std::slice::from_ref(&self.reference_id))
            .await?;
        usd_price_of(&body, &self.reference_id).ok_or_else(|| SourceError::MissingPrice {
            source_name: NAME.to_string(),
            id: self.reference_id.clone(),
        })
    }
}
