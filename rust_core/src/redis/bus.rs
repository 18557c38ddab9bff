use anyhow::{Context, Result};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::Serialize;

/// Publish side of Redis pub/sub, used to mirror snapshot broadcasts to other
/// processes.
#[derive(Clone)]
pub struct RedisBus {
    connection: ConnectionManager,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Invalid REDIS_URL")?;
        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to connect Redis bus")?;

        Ok(Self { connection })
    }

    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.publish_str(channel, &payload).await
    }

    pub async fn publish_str(&self, channel: &str, message: &str) -> Result<()> {
        // ConnectionManager is a cheap handle onto one multiplexed connection
        let mut conn = self.connection.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .context("Failed to publish message")?;
        Ok(())
    }
}
