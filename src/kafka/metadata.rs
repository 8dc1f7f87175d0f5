use std::sync::Arc;

use crate::error::Result;
use crate::kafka::offsets::TopicMetadata;
use crate::kafka::Broker;

/// Per-request watermark lookups. Holds no connection of its own: every
/// `fetch` goes through a fresh short-lived admin connection in the broker.
#[derive(Clone)]
pub struct TopicMetadataReader {
    broker: Arc<dyn Broker>,
}

impl TopicMetadataReader {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn fetch(&self, topic: &str) -> Result<TopicMetadata> {
        let watermarks = self.broker.fetch_watermarks(topic).await?;
        let metadata = TopicMetadata::from_watermarks(topic, &watermarks);
        tracing::debug!(
            topic = %topic,
            partitions = metadata.partitions.len(),
            total_messages = metadata.total_messages,
            "Fetched topic metadata"
        );
        Ok(metadata)
    }
}
