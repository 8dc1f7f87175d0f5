//! Broker access: the abstract capability the viewer reads through, plus the
//! windowing pieces (planner, collector, merger) built on top of it.

pub mod message;
pub mod offsets;
pub mod collector;
pub mod merge;
pub mod metadata;
pub mod memory;
#[cfg(feature = "kafka")]
pub mod rdkafka_broker;

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream};

use crate::error::{Result, ViewerError};
use crate::kafka::message::Message;
use crate::kafka::offsets::{PartitionStart, PartitionWatermarks};

pub use message::parse_headers;
pub use offsets::{plan, TopicMetadata};

/// What the viewer needs from a broker client.
///
/// Connection handling, the wire protocol and retry/backoff belong to the
/// implementation. Each call to `fetch_watermarks` uses its own short-lived
/// connection; `subscribe` connects once and stays attached until the returned
/// [`Subscription`] is closed.
pub trait Broker: Send + Sync + 'static {
    /// Partition list with low/high watermarks. `TopicNotFound` when the
    /// broker does not know the topic.
    fn fetch_watermarks<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<Vec<PartitionWatermarks>>>;

    /// Assigns every listed partition, seeks it to its start offset and
    /// streams records from there on. Offsets are never committed.
    fn subscribe<'a>(&'a self, group_id: &'a str, starts: Vec<PartitionStart>) -> BoxFuture<'a, Result<Subscription>>;
}

type Release = Box<dyn FnOnce() -> Result<()> + Send>;

/// A live, seeked stream of records.
pub struct Subscription {
    records: BoxStream<'static, Result<Message>>,
    release: Option<Release>,
}

impl Subscription {
    /// `release` runs on the blocking pool when the subscription is closed.
    pub fn new(records: BoxStream<'static, Result<Message>>, release: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            records,
            release: Some(Box::new(release)),
        }
    }

    /// Stops consuming and releases the connection.
    ///
    /// Never fails: a release error, panic or a release slower than `grace`
    /// is logged and the caller moves on.
    pub async fn close(mut self, grace: Duration) {
        let Some(release) = self.release.take() else { return };
        drop(self);

        let task = tokio::task::spawn_blocking(release);
        match tokio::time::timeout(grace, task).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Subscription released"),
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Subscription release failed"),
            Ok(Err(join)) => {
                let e = ViewerError::Disconnect(join.to_string());
                tracing::warn!(error = %e, "Subscription release panicked");
            }
            Err(_) => tracing::warn!(grace_ms = grace.as_millis() as u64, "Subscription release timed out; continuing"),
        }
    }
}

impl Stream for Subscription {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.as_mut().poll_next(cx)
    }
}
