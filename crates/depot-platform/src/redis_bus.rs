use anyhow::Result;
use async_trait::async_trait;
use depot_core::{Notifier, PostingNotice};
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::info;

/// Channel carrying document state changes.
pub const DOCUMENT_CHANNEL: &str = "stock.documents";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for RedisBus {
    async fn notify(&self, notice: &PostingNotice) -> Result<()> {
        self.publish_json(DOCUMENT_CHANNEL, notice).await
    }
}

/// Stand-in when no broker is configured; notices only reach the log.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &PostingNotice) -> Result<()> {
        info!(
            document_id = %notice.document_id,
            number = %notice.number,
            status = %notice.status,
            "document notice"
        );
        Ok(())
    }
}
