//! DexScreener pair-search client
//!
//! Searches trading pairs by free text and normalizes each pair's base token
//! into a [`TokenRecord`]. DexScreener reports market cap, volume and
//! liquidity in USD; those are converted to the native quote currency with the
//! pair's own `priceNative / priceUsd` ratio.

use super::http::RetryingHttpClient;
use super::token_source::TokenSource;
use crate::types::{SourceTag, TokenRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";
pub const DEFAULT_CHAIN_ID: &str = "solana";

/// Pair-search adapter
pub struct DexScreenerClient {
    http: RetryingHttpClient,
    base_url: String,
    chain_id: String,
}

impl DexScreenerClient {
    pub fn new(http: RetryingHttpClient) -> Self {
        Self::with_base_url(http, DEFAULT_BASE_URL, DEFAULT_CHAIN_ID)
    }

    pub fn with_base_url(
        http: RetryingHttpClient,
        base_url: impl Into<String>,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chain_id: chain_id.into(),
        }
    }
}

#[async_trait]
impl TokenSource for DexScreenerClient {
    fn source_name(&self) -> &str {
        "DexScreener"
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenRecord>> {
        let url = format!("{}/latest/dex/search", self.base_url);

        let response: SearchResponse = self
            .http
            .get_json(&url, &[("q", query)])
            .await
            .context("DexScreener search failed")?;

        Ok(response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|pair| pair.chain_id == self.chain_id)
            .filter_map(normalize_pair)
            .collect())
    }
}

/// Map one pair onto the canonical record.
///
/// Returns `None` when the native price is missing or not a finite,
/// non-negative number.
fn normalize_pair(pair: DexPair) -> Option<TokenRecord> {
    let price_native = pair
        .price_native
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p >= 0.0)?;

    // Missing or unusable USD price behaves like a 1:1 quote
    let price_usd = pair
        .price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(1.0);
    // A tiny USD quote can push the ratio past f64::MAX; such metrics read as 0
    let usd_to_native = |usd: f64| finite_or_zero(usd / price_usd * price_native);

    let market_cap_usd = pair
        .market_cap
        .filter(|v| *v > 0.0)
        .or(pair.fdv.filter(|v| *v > 0.0))
        .unwrap_or(0.0);

    let txns = pair.txns.unwrap_or_default().h24.unwrap_or_default();
    let change = pair.price_change.unwrap_or_default();

    Some(TokenRecord {
        address: pair.base_token.address,
        name: pair.base_token.name,
        ticker: pair.base_token.symbol,
        price: price_native,
        market_cap: usd_to_native(market_cap_usd),
        volume: usd_to_native(pair.volume.and_then(|v| v.h24).unwrap_or(0.0)),
        liquidity: usd_to_native(pair.liquidity.and_then(|l| l.usd).unwrap_or(0.0)),
        transaction_count: txns.buys.unwrap_or(0) + txns.sells.unwrap_or(0),
        change_1h: change.h1.unwrap_or(0.0),
        change_24h: change.h24.unwrap_or(0.0),
        // Not exposed by the search endpoint
        change_7d: 0.0,
        source: SourceTag::Dexscreener,
    })
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    chain_id: String,
    base_token: BaseToken,
    #[serde(default)]
    price_native: Option<String>,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    fdv: Option<f64>,
    #[serde(default)]
    volume: Option<VolumeWindows>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
    #[serde(default)]
    txns: Option<TxnWindows>,
    #[serde(default)]
    price_change: Option<PriceChange>,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeWindows {
    h24: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TxnWindows {
    h24: Option<TxnCounts>,
}

#[derive(Debug, Default, Deserialize)]
struct TxnCounts {
    buys: Option<u64>,
    sells: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceChange {
    h1: Option<f64>,
    h24: Option<f64>,
}
