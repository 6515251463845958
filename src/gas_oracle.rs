//! Gas price quotes from Polygon-style gas station endpoints.
//!
//! A station answers a plain GET with a JSON object keyed by speed tier.
//! The v1 stations return a number of gwei per tier
//! (`{"safeLow": 30.0, "standard": 31.5, "fast": 35.0, ...}`), the v2
//! stations an object per tier (`{"standard": {"maxPriorityFee": 30.1,
//! "maxFee": 45.2}, ...}`). Both shapes are accepted.

use crate::error::{KeeperError, KeeperResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const WEI_PER_GWEI: f64 = 1_000_000_000.0;

/// A gas price in gwei as reported by an oracle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasQuote {
    pub gwei: f64,
}

impl GasQuote {
    pub fn from_gwei(gwei: f64) -> KeeperResult<Self> {
        if !gwei.is_finite() || gwei < 0.0 {
            return Err(KeeperError::GasOracle(format!(
                "Gas quote must be a non-negative number, got {}",
                gwei
            )));
        }
        Ok(Self { gwei })
    }

    /// The quote in the chain's base unit.
    pub fn to_wei(&self) -> u128 {
        (self.gwei * WEI_PER_GWEI).round() as u128
    }
}

#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn fetch_quote(&self) -> KeeperResult<GasQuote>;
}

/// Read the requested tier out of a gas station response body.
pub fn parse_quote(body: &Value, tier: &str) -> KeeperResult<GasQuote> {
    let entry = body
        .get(tier)
        .ok_or_else(|| KeeperError::GasOracle(format!("Response has no '{}' field", tier)))?;

    let gwei = match entry {
        Value::Number(n) => n.as_f64(),
        Value::Object(fields) => fields.get("maxFee").and_then(Value::as_f64),
        _ => None,
    }
    .ok_or_else(|| {
        KeeperError::GasOracle(format!("Field '{}' is not a gas price: {}", tier, entry))
    })?;

    GasQuote::from_gwei(gwei)
}

/// HTTP gas station client that walks its endpoints in order until one
/// answers with a usable quote.
pub struct GasStationOracle {
    client: reqwest::Client,
    urls: Vec<String>,
    tier: String,
}

impl GasStationOracle {
    pub fn new(urls: Vec<String>, tier: impl Into<String>, timeout: Duration) -> KeeperResult<Self> {
        if urls.is_empty() {
            return Err(KeeperError::Config("No gas oracle URL configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeeperError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            urls,
            tier: tier.into(),
        })
    }

    async fn fetch_from(&self, url: &str) -> KeeperResult<GasQuote> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| KeeperError::GasOracle(format!("GET {} failed: {}", url, e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| KeeperError::GasOracle(format!("Invalid JSON from {}: {}", url, e)))?;

        parse_quote(&body, &self.tier)
    }
}

#[async_trait]
impl GasOracle for GasStationOracle {
    async fn fetch_quote(&self) -> KeeperResult<GasQuote> {
        let mut last_error = None;

        for (i, url) in self.urls.iter().enumerate() {
            match self.fetch_from(url).await {
                Ok(quote) => {
                    debug!(url = %url, gwei = quote.gwei, tier = %self.tier, "Gas quote fetched");
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(oracle_idx = i, url = %url, error = %e, "Gas oracle failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| KeeperError::GasOracle("No gas oracle URL configured".to_string())))
    }
}
