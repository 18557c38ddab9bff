//! Jupiter token registry + price client
//!
//! Two calls per search: the token registry resolves a free-text query to
//! token identities, then one batch price lookup prices the top matches.
//! Jupiter supplies no volume, market cap or change data, so those fields stay
//! at zero.

use super::http::RetryingHttpClient;
use super::token_source::TokenSource;
use crate::types::{SourceTag, TokenRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://lite-api.jup.ag";
pub const DEFAULT_PRICE_BASE_URL: &str = "https://api.jup.ag";

/// Registry matches priced per search
const MAX_PRICED_TOKENS: usize = 20;

pub struct JupiterClient {
    http: RetryingHttpClient,
    search_base_url: String,
    price_base_url: String,
}

impl JupiterClient {
    pub fn new(http: RetryingHttpClient) -> Self {
        Self::with_base_urls(http, DEFAULT_SEARCH_BASE_URL, DEFAULT_PRICE_BASE_URL)
    }

    pub fn with_base_urls(
        http: RetryingHttpClient,
        search_base_url: impl Into<String>,
        price_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            search_base_url: search_base_url.into().trim_end_matches('/').to_string(),
            price_base_url: price_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn search_registry(&self, query: &str) -> Result<Vec<RegistryToken>> {
        let url = format!("{}/tokens/v2/search", self.search_base_url);
        let body: SearchBody = self
            .http
            .get_json(&url, &[("query", query)])
            .await
            .context("Jupiter token search failed")?;

        let mut tokens = body.into_tokens();
        tokens.retain(|t| t.address().is_some());
        tokens.truncate(MAX_PRICED_TOKENS);
        Ok(tokens)
    }

    /// Batch price lookup keyed by comma-joined addresses
    async fn fetch_prices(&self, addresses: &[&str]) -> Result<HashMap<String, f64>> {
        let url = format!("{}/price/v2", self.price_base_url);
        let ids = addresses.join(",");
        let body: PriceBody = self
            .http
            .get_json(&url, &[("ids", ids.as_str())])
            .await
            .context("Jupiter price lookup failed")?;

        Ok(body
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(address, entry)| {
                let price = entry?.price?.as_f64()?;
                Some((address, price))
            })
            .collect())
    }
}

#[async_trait]
impl TokenSource for JupiterClient {
    fn source_name(&self) -> &str {
        "Jupiter"
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenRecord>> {
        let tokens = self.search_registry(query).await?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let addresses: Vec<&str> = tokens.iter().filter_map(|t| t.address()).collect();
        let prices = self.fetch_prices(&addresses).await?;
        debug!(
            "Jupiter priced {}/{} tokens for '{}'",
            prices.len(),
            tokens.len(),
            query
        );

        Ok(tokens
            .into_iter()
            .filter_map(|token| {
                let address = token.address()?.to_string();
                let price = *prices.get(&address)?;
                let mut record =
                    TokenRecord::new(address, token.name, token.symbol, SourceTag::Jupiter);
                record.price = price;
                Some(record)
            })
            .collect())
    }
}

/// The search endpoint has answered both as a bare array and wrapped in `tokens`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchBody {
    Bare(Vec<RegistryToken>),
    Wrapped {
        #[serde(default)]
        tokens: Vec<RegistryToken>,
    },
}

impl SearchBody {
    fn into_tokens(self) -> Vec<RegistryToken> {
        match self {
            SearchBody::Bare(tokens) => tokens,
            SearchBody::Wrapped { tokens } => tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryToken {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

impl RegistryToken {
    fn address(&self) -> Option<&str> {
        self.address.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    #[serde(default)]
    data: Option<HashMap<String, Option<PriceEntry>>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    price: Option<NumberOrString>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            NumberOrString::Number(n) => *n,
            NumberOrString::Text(s) => s.parse().ok()?,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}
