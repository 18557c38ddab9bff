//! Canonical token record shared by every stage of the pipeline.
//!
//! Wire names follow the dashboard contract (`token_address`, `price_sol`, ...),
//! so the same struct is used for cache payloads, REST responses and
//! broadcast frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which adapter produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Pair-search aggregator (many fields per match)
    Dexscreener,
    /// Token registry + batch price lookup (sparse records)
    Jupiter,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dexscreener => "dexscreener",
            Self::Jupiter => "jupiter",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token as seen by one source.
///
/// A source that cannot supply a numeric field reports `0`. That zero cannot be
/// told apart from a genuine zero; consumers must not read meaning into it.
/// Records are never edited after creation, only replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Globally unique token identifier and dedup key
    #[serde(rename = "token_address")]
    pub address: String,
    #[serde(rename = "token_name", default)]
    pub name: String,
    #[serde(rename = "token_ticker", default)]
    pub ticker: String,
    /// Price in the native quote currency
    #[serde(rename = "price_sol", default)]
    pub price: f64,
    #[serde(rename = "market_cap_sol", default)]
    pub market_cap: f64,
    /// Rolling 24h volume in the native quote currency
    #[serde(rename = "volume_sol", default)]
    pub volume: f64,
    #[serde(rename = "liquidity_sol", default)]
    pub liquidity: f64,
    #[serde(default)]
    pub transaction_count: u64,
    /// Signed percentage change over the last hour
    #[serde(rename = "price_1hr_change", default)]
    pub change_1h: f64,
    #[serde(rename = "price_24hr_change", default)]
    pub change_24h: f64,
    #[serde(rename = "price_7d_change", default)]
    pub change_7d: f64,
    #[serde(rename = "protocol")]
    pub source: SourceTag,
}

impl TokenRecord {
    /// Create a record with identity fields set and every metric at zero.
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        ticker: impl Into<String>,
        source: SourceTag,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            ticker: ticker.into(),
            price: 0.0,
            market_cap: 0.0,
            volume: 0.0,
            liquidity: 0.0,
            transaction_count: 0,
            change_1h: 0.0,
            change_24h: 0.0,
            change_7d: 0.0,
            source,
        }
    }
}

/// Numeric fields the listing endpoint may sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Volume,
    MarketCap,
    Change1h,
    Change24h,
    Change7d,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Volume,
        SortField::MarketCap,
        SortField::Change1h,
        SortField::Change24h,
        SortField::Change7d,
    ];

    /// Parse a `sort_by` request value. Anything outside the allow-list is `None`.
    pub fn from_param(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }

    /// Wire name of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "volume_sol",
            Self::MarketCap => "market_cap_sol",
            Self::Change1h => "price_1hr_change",
            Self::Change24h => "price_24hr_change",
            Self::Change7d => "price_7d_change",
        }
    }

    /// Sort key for a record; undefined values (NaN) count as zero.
    pub fn value_of(&self, record: &TokenRecord) -> f64 {
        let value = match self {
            Self::Volume => record.volume,
            Self::MarketCap => record.market_cap,
            Self::Change1h => record.change_1h,
            Self::Change24h => record.change_24h,
            Self::Change7d => record.change_7d,
        };
        if value.is_nan() {
            0.0
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let mut record = TokenRecord::new("So111", "Wrapped SOL", "SOL", SourceTag::Dexscreener);
        record.volume = 12.5;
        record.transaction_count = 7;

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["token_address"], "So111");
        assert_eq!(json["token_ticker"], "SOL");
        assert_eq!(json["volume_sol"], 12.5);
        assert_eq!(json["transaction_count"], 7);
        assert_eq!(json["protocol"], "dexscreener");
    }

    #[test]
    fn test_missing_metrics_default_to_zero() {
        let record: TokenRecord = serde_json::from_str(
            r#"{"token_address":"abc","protocol":"jupiter","price_sol":1.5}"#,
        )
        .unwrap();

        assert_eq!(record.price, 1.5);
        assert_eq!(record.volume, 0.0);
        assert_eq!(record.market_cap, 0.0);
        assert_eq!(record.name, "");
        assert_eq!(record.source, SourceTag::Jupiter);
    }

    #[test]
    fn test_sort_field_allow_list() {
        assert_eq!(SortField::from_param("volume_sol"), Some(SortField::Volume));
        assert_eq!(SortField::from_param("market_cap_sol"), Some(SortField::MarketCap));
        assert_eq!(SortField::from_param("price_7d_change"), Some(SortField::Change7d));

        // Numeric but not sortable
        assert_eq!(SortField::from_param("price_sol"), None);
        assert_eq!(SortField::from_param("liquidity_sol"), None);
        assert_eq!(SortField::from_param(""), None);
    }

    #[test]
    fn test_sort_value_treats_nan_as_zero() {
        let mut record = TokenRecord::new("a", "", "", SourceTag::Jupiter);
        record.change_24h = f64::NAN;
        assert_eq!(SortField::Change24h.value_of(&record), 0.0);
    }
}
