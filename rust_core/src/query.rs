//! Token listing read path.
//!
//! Serves either the canonical snapshot or a cached live search, then sorts
//! and slices it. The cursor is a plain integer offset re-applied to whatever
//! snapshot is current, so a page requested after a refresh may skip or repeat
//! rows relative to the previous page.

use crate::cache::{search_key, CacheError, TieredCache, SNAPSHOT_KEY};
use crate::clients::TokenSource;
use crate::types::{SortField, TokenRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_SORT: SortField = SortField::Volume;

/// Raw listing options as they arrive on the query string. Values are kept as
/// strings so malformed numbers fall back to defaults instead of rejecting the
/// request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub sort_by: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub q: Option<String>,
}

impl TokenQuery {
    /// `None` means "leave source order alone"
    pub fn sort_field(&self) -> Option<SortField> {
        match self.sort_by.as_deref() {
            None => Some(DEFAULT_SORT),
            Some(field) => SortField::from_param(field),
        }
    }

    pub fn page_size(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.cursor
            .as_deref()
            .and_then(|c| c.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPage {
    pub data: Vec<TokenRecord>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl TokenPage {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            next_cursor: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to load tokens: {0}")]
    Cache(#[from] CacheError),
}

/// Sort descending by `field`; `None` keeps the input order.
pub fn sort_tokens(mut tokens: Vec<TokenRecord>, field: Option<SortField>) -> Vec<TokenRecord> {
    if let Some(field) = field {
        tokens.sort_by(|a, b| field.value_of(b).total_cmp(&field.value_of(a)));
    }
    tokens
}

/// Slice one page out of an already-sorted list.
pub fn paginate(tokens: Vec<TokenRecord>, offset: usize, limit: usize) -> TokenPage {
    if offset >= tokens.len() {
        return TokenPage::empty();
    }

    let end = offset.saturating_add(limit);
    let next_cursor = (end < tokens.len()).then(|| end.to_string());
    let data = tokens.into_iter().skip(offset).take(limit).collect();

    TokenPage { data, next_cursor }
}

pub struct QueryService {
    cache: TieredCache,
    search_source: Arc<dyn TokenSource>,
    search_ttl: Duration,
}

impl QueryService {
    pub fn new(
        cache: TieredCache,
        search_source: Arc<dyn TokenSource>,
        search_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            search_source,
            search_ttl,
        }
    }

    pub async fn list_tokens(&self, query: &TokenQuery) -> Result<TokenPage, QueryError> {
        let tokens = match query.search_term() {
            Some(term) => self.search(term).await?,
            // Nothing cached yet is an empty listing, not an error
            None => self
                .cache
                .get_json::<Vec<TokenRecord>>(SNAPSHOT_KEY)
                .await?
                .unwrap_or_default(),
        };

        let sorted = sort_tokens(tokens, query.sort_field());
        Ok(paginate(sorted, query.offset(), query.page_size()))
    }

    async fn search(&self, term: &str) -> Result<Vec<TokenRecord>, QueryError> {
        let key = search_key(term);
        if let Some(cached) = self.cache.get_json::<Vec<TokenRecord>>(&key).await? {
            debug!("Search cache hit for '{}'", term);
            return Ok(cached);
        }

        let records = self.search_source.fetch(term).await;
        self.cache.set_json(&key, &records, self.search_ttl).await?;
        Ok(records)
    }
}
