//! Snapshot fan-out to live subscribers.
//!
//! Every refresh tick publishes the full snapshot (not a diff) on the
//! `price-update` channel. In-process subscribers (WebSocket sessions) receive
//! it through a tokio broadcast channel; when a [`RedisBus`] is attached the
//! same payload is also published to Redis for other processes.

use crate::redis::RedisBus;
use crate::types::TokenRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const PRICE_UPDATE_EVENT: &str = "price-update";

/// One immutable refresh result, shared by every subscriber
pub type Snapshot = Arc<Vec<TokenRecord>>;

/// Frame sent to WebSocket subscribers
#[derive(Debug, Serialize)]
pub struct PriceUpdateFrame<'a> {
    pub event: &'static str,
    pub data: &'a [TokenRecord],
}

impl<'a> PriceUpdateFrame<'a> {
    pub fn new(data: &'a [TokenRecord]) -> Self {
        Self {
            event: PRICE_UPDATE_EVENT,
            data,
        }
    }
}

#[derive(Clone)]
pub struct SnapshotHub {
    tx: broadcast::Sender<Snapshot>,
    bus: Option<RedisBus>,
}

impl SnapshotHub {
    /// `capacity` bounds how many snapshots a slow subscriber may fall behind
    /// before it starts skipping.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, bus: None }
    }

    pub fn with_redis_mirror(mut self, bus: RedisBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish to every subscriber. Returns the number of in-process receivers
    /// reached; having none is not an error.
    pub async fn publish(&self, snapshot: Snapshot) -> Result<usize> {
        let delivered = self.tx.send(snapshot.clone()).unwrap_or(0);

        if let Some(bus) = &self.bus {
            bus.publish(PRICE_UPDATE_EVENT, snapshot.as_slice())
                .await
                .context("Failed to mirror price update to Redis")?;
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceTag;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = SnapshotHub::new(4);
        let delivered = hub.publish(Arc::new(Vec::new())).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_full_snapshot() {
        let hub = SnapshotHub::new(4);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let snapshot = Arc::new(vec![TokenRecord::new("a", "A", "A", SourceTag::Jupiter)]);
        assert_eq!(hub.publish(snapshot.clone()).await.unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), snapshot);
        assert_eq!(second.recv().await.unwrap(), snapshot);
    }

    #[test]
    fn test_frame_shape() {
        let records = vec![TokenRecord::new("a", "A", "A", SourceTag::Jupiter)];
        let json = serde_json::to_value(PriceUpdateFrame::new(&records)).unwrap();
        assert_eq!(json["event"], "price-update");
        assert_eq!(json["data"][0]["token_address"], "a");
    }
}
