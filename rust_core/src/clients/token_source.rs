//! Token Source Trait
//!
//! Common interface for upstream token data providers. The refresh scheduler
//! and the live search path both consume sources through this trait, so a
//! provider is implemented once and used from either call site.

use crate::types::TokenRecord;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Display name used in logs (e.g., "DexScreener")
    fn source_name(&self) -> &str;

    /// Query the provider and normalize its response into canonical records.
    ///
    /// # Returns
    /// * `Ok(Vec<TokenRecord>)` - Every record the provider matched (may be empty)
    /// * `Err` - Transport, status or decode failure after retries
    async fn search(&self, query: &str) -> Result<Vec<TokenRecord>>;

    /// Infallible form of [`search`](TokenSource::search).
    ///
    /// Failures are logged and degrade to an empty contribution.
    async fn fetch(&self, query: &str) -> Vec<TokenRecord> {
        match self.search(query).await {
            Ok(records) => {
                debug!(
                    "{} returned {} tokens for '{}'",
                    self.source_name(),
                    records.len(),
                    query
                );
                records
            }
            Err(e) => {
                warn!("Error fetching '{}' from {}: {:#}", query, self.source_name(), e);
                Vec::new()
            }
        }
    }
}
