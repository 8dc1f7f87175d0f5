//! Kafka adapter over librdkafka.
//!
//! Metadata lookups are blocking calls, so they run on the blocking pool with a
//! throwaway `BaseConsumer` that is dropped (and disconnected) before the task
//! returns. Subscriptions use a `StreamConsumer` with a manual assignment at the
//! planned offsets; nothing is ever committed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use rdkafka::{Offset, TopicPartitionList};

use crate::config::KafkaConfig;
use crate::error::{Result, ViewerError};
use crate::kafka::message::{parse_headers, Message};
use crate::kafka::offsets::{PartitionStart, PartitionWatermarks};
use crate::kafka::{Broker, Subscription};

pub struct KafkaBroker {
    client: ClientConfig,
    request_timeout: Duration,
}

impl KafkaBroker {
    pub fn new(config: &KafkaConfig) -> Self {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", config.brokers.join(","))
            .set("client.id", &config.client_id)
            .set("security.protocol", "ssl")
            .set("ssl.ca.pem", &config.ca)
            .set("ssl.key.pem", &config.private_key)
            .set("ssl.certificate.pem", &config.certificate)
            .set("enable.ssl.certificate.verification", "true")
            .set("socket.connection.setup.timeout.ms", config.connection_timeout_ms.to_string())
            .set("socket.timeout.ms", config.request_timeout_ms.to_string())
            .set("reconnect.backoff.ms", config.retry_backoff_ms.to_string())
            .set_log_level(RDKafkaLogLevel::Warning);

        Self {
            client,
            request_timeout: config.request_timeout(),
        }
    }
}

fn connection_error(e: rdkafka::error::KafkaError) -> ViewerError {
    ViewerError::Connection(e.to_string())
}

fn broker_error(e: rdkafka::error::KafkaError) -> ViewerError {
    ViewerError::Broker(e.to_string())
}

fn read_watermarks(client: ClientConfig, topic: String, timeout: Duration) -> Result<Vec<PartitionWatermarks>> {
    let admin: BaseConsumer = client.create().map_err(connection_error)?;

    let metadata = admin.fetch_metadata(Some(&topic), timeout).map_err(connection_error)?;
    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| ViewerError::TopicNotFound(topic.clone()))?;

    if topic_metadata.error().is_some() || topic_metadata.partitions().is_empty() {
        return Err(ViewerError::TopicNotFound(topic));
    }

    topic_metadata
        .partitions()
        .iter()
        .map(|p| {
            let (low, high) = admin.fetch_watermarks(&topic, p.id(), timeout).map_err(broker_error)?;
            Ok(PartitionWatermarks::new(p.id(), low, high))
        })
        .collect()
}

fn to_message(record: &BorrowedMessage<'_>) -> Message {
    let headers = record
        .headers()
        .map(|h| parse_headers(h.iter().map(|header| (header.key, header.value))))
        .unwrap_or_default();

    Message {
        topic: record.topic().to_string(),
        partition: record.partition(),
        offset: record.offset(),
        // no local clock correction: missing timestamps sort last
        timestamp: record.timestamp().to_millis().unwrap_or(0),
        key: record.key().map(Bytes::copy_from_slice),
        value: record.payload().map(Bytes::copy_from_slice),
        headers,
    }
}

impl Broker for KafkaBroker {
    fn fetch_watermarks<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<Vec<PartitionWatermarks>>> {
        let client = self.client.clone();
        let topic = topic.to_string();
        let timeout = self.request_timeout;

        async move {
            tokio::task::spawn_blocking(move || read_watermarks(client, topic, timeout))
                .await
                .map_err(|e| ViewerError::Broker(format!("metadata task failed: {e}")))?
        }
        .boxed()
    }

    fn subscribe<'a>(&'a self, group_id: &'a str, starts: Vec<PartitionStart>) -> BoxFuture<'a, Result<Subscription>> {
        async move {
            let mut config = self.client.clone();
            config
                .set("group.id", group_id)
                .set("enable.auto.commit", "false")
                .set("enable.auto.offset.store", "false")
                .set("auto.offset.reset", "earliest");

            let consumer: StreamConsumer = config.create().map_err(connection_error)?;

            let mut assignment = TopicPartitionList::new();
            for start in &starts {
                assignment
                    .add_partition_offset(&start.topic, start.partition, Offset::Offset(start.offset))
                    .map_err(broker_error)?;
            }
            consumer.assign(&assignment).map_err(broker_error)?;

            tracing::info!(group_id = %group_id, partitions = starts.len(), "Kafka subscription assigned");

            let consumer = Arc::new(consumer);
            let records = stream::unfold(consumer.clone(), |consumer| async move {
                let received = consumer.recv().await;
                let item = received.map(|record| to_message(&record)).map_err(broker_error);
                Some((item, consumer))
            })
            .boxed();

            Ok(Subscription::new(records, move || {
                consumer.unassign().map_err(|e| ViewerError::Disconnect(e.to_string()))
            }))
        }
        .boxed()
    }
}
