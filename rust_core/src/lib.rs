//! Token Pulse Core - token price ingestion, merge, cache and fan-out.
//!
//! This crate provides:
//! - Upstream adapters for DexScreener pair search and the Jupiter token registry
//! - Retrying HTTP transport with linear backoff
//! - Address-keyed merge and cross-query volume dedup
//! - Two-tier cache (Redis with an in-process fallback)
//! - Periodic refresh scheduler that publishes full snapshots
//! - Sorted, cursor-paginated token listing and cached live search

mod types;

pub mod aggregator;
pub mod broadcast;
pub mod cache;
pub mod clients;
pub mod query;
pub mod redis;
pub mod refresh;

pub use types::*;
