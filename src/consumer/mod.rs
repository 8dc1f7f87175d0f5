//! Consumer Service: the process-wide continuous poller.
//!
//! Lifecycle:
//! - `Stopped -> Starting -> Running` on `start()`.
//! - `Running -> Failed` when the subscription errors; the next read access
//!   (`ensure_running`) schedules a restart in the background.
//! - any state `-> Stopped` on `disconnect()`, including a start still
//!   waiting on the broker.
//!
//! One ingestion task owns the subscription and is the only writer of the
//! [`ConsumerStore`]. Readers never touch the broker.

pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConsumerConfig;
use crate::error::{Result, ViewerError};
use crate::kafka::collector::{self, Completion};
use crate::kafka::message::Message;
use crate::kafka::offsets::{self, PartitionStart};
use crate::kafka::{Broker, Subscription};
use crate::consumer::store::ConsumerStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Starting,
    Running,
    Failed,
}

#[derive(Clone, Debug)]
pub struct ConsumerStatus {
    pub state: ConsumerState,
    pub group_id: String,
    pub topics: Vec<String>,
    pub last_updated: BTreeMap<String, DateTime<Utc>>,
    pub message_count: BTreeMap<String, usize>,
    pub total_messages: usize,
}

impl ConsumerStatus {
    pub fn is_running(&self) -> bool {
        self.state == ConsumerState::Running
    }
}

struct IngestHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConsumerService {
    broker: Arc<dyn Broker>,
    store: Arc<ConsumerStore>,
    config: ConsumerConfig,
    group_id: String,
    topics: Vec<String>,
    state: Arc<Mutex<ConsumerState>>,
    ingest: Mutex<Option<IngestHandle>>,
}

impl ConsumerService {
    pub fn new(broker: Arc<dyn Broker>, topics: Vec<String>, group_id: String, config: ConsumerConfig) -> Self {
        Self {
            broker,
            store: Arc::new(ConsumerStore::new(config.buffer_capacity)),
            config,
            group_id,
            topics,
            state: Arc::new(Mutex::new(ConsumerState::Stopped)),
            ingest: Mutex::new(None),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn tracks(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Subscribes to every configured topic and spawns ingestion.
    /// Calling it while starting or running does nothing.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ConsumerState::Starting | ConsumerState::Running => return Ok(()),
                ConsumerState::Stopped | ConsumerState::Failed => *state = ConsumerState::Starting,
            }
        }

        // a previous run that failed left its finished task behind
        self.reap_ingest_task().await;

        let subscription = match self.open_subscription().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(group_id = %self.group_id, error = %e, "Consumer failed to start");
                let mut state = self.state.lock();
                if *state == ConsumerState::Starting {
                    *state = ConsumerState::Failed;
                }
                return Err(e);
            }
        };

        // a disconnect while the subscription was opening wins
        let orphan = {
            let mut state = self.state.lock();
            if *state == ConsumerState::Starting {
                *self.ingest.lock() = Some(self.spawn_ingest(subscription));
                *state = ConsumerState::Running;
                None
            } else {
                Some(subscription)
            }
        };
        if let Some(subscription) = orphan {
            info!(group_id = %self.group_id, "Consumer stopped while starting; releasing subscription");
            subscription.close(self.config.close_timeout()).await;
            return Ok(());
        }

        info!(group_id = %self.group_id, topics = ?self.topics, "Consumer running");
        Ok(())
    }

    /// Schedules a restart of a failed consumer and returns right away, so
    /// readers keep getting the buffered data while the broker is slow or
    /// down. Returns the restart task, or `None` when no restart was needed.
    pub fn ensure_running(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.state() != ConsumerState::Failed {
            return None;
        }
        info!(group_id = %self.group_id, "Restarting failed consumer");
        let consumer = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = consumer.start().await {
                warn!(error = %e, "Consumer restart failed; serving buffered messages");
            }
        }))
    }

    /// Stops ingestion and waits until the subscription is released.
    pub async fn disconnect(&self) {
        let handle = {
            let mut state = self.state.lock();
            *state = ConsumerState::Stopped;
            self.ingest.lock().take()
        };
        if let Some(IngestHandle { shutdown, task }) = handle {
            shutdown.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "Ingestion task ended abnormally");
            }
        }
        info!(group_id = %self.group_id, "Consumer stopped");
    }

    /// Buffered messages for `topic`, most recently ingested first.
    pub fn get_messages(&self, topic: &str, max: usize) -> Vec<Message> {
        self.store.get_messages(topic, max)
    }

    pub fn last_updated(&self, topic: &str) -> Option<DateTime<Utc>> {
        self.store.last_updated(topic)
    }

    pub fn buffered(&self, topic: &str) -> usize {
        self.store.len(topic)
    }

    pub fn status(&self) -> ConsumerStatus {
        let snapshot = self.store.snapshot();
        ConsumerStatus {
            state: self.state(),
            group_id: self.group_id.clone(),
            topics: self.topics.clone(),
            total_messages: snapshot.total_messages(),
            last_updated: snapshot.last_updated,
            message_count: snapshot.message_count,
        }
    }

    fn spawn_ingest(&self, subscription: Subscription) -> IngestHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(ingest_loop(
            subscription,
            self.store.clone(),
            self.state.clone(),
            shutdown.clone(),
            IngestSettings {
                batch_size: self.config.batch_size,
                batch_window: self.config.batch_window(),
                close_timeout: self.config.close_timeout(),
            },
        ));
        IngestHandle { shutdown, task }
    }

    async fn reap_ingest_task(&self) {
        let handle = self.ingest.lock().take();
        if let Some(IngestHandle { shutdown, task }) = handle {
            shutdown.cancel();
            let _ = task.await;
        }
    }

    /// Plans start offsets so that each topic's buffer fills up to capacity
    /// with its most recent messages, however unevenly the partitions are
    /// written. A topic that fits in the buffer is read from its earliest
    /// retained offset. Empty partitions are assigned at their high
    /// watermark so later writes still arrive. Partitions already ingested
    /// resume right after their last buffered offset.
    async fn open_subscription(&self) -> Result<Subscription> {
        let mut starts: Vec<PartitionStart> = Vec::new();

        for topic in &self.topics {
            let watermarks = match self.broker.fetch_watermarks(topic).await {
                Ok(w) => w,
                Err(ViewerError::TopicNotFound(_)) => {
                    warn!(topic = %topic, "Topic not found on broker; skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let planned = offsets::plan_filled(topic, &watermarks, self.store.capacity());
            for w in &watermarks {
                // after a restart, pick up where ingestion left off
                let resumed = self.store.resume_offset(topic, w.partition).map(|next| next.clamp(w.low, w.high));
                let offset = resumed.unwrap_or_else(|| {
                    planned
                        .iter()
                        .find(|s| s.partition == w.partition)
                        .map(|s| s.offset)
                        .unwrap_or(w.high)
                });
                starts.push(PartitionStart { topic: topic.clone(), partition: w.partition, offset });
            }
        }

        if starts.is_empty() {
            return Err(ViewerError::TopicNotFound(self.topics.join(", ")));
        }

        self.broker.subscribe(&self.group_id, starts).await
    }
}

struct IngestSettings {
    batch_size: usize,
    batch_window: Duration,
    close_timeout: Duration,
}

async fn ingest_loop(
    mut subscription: Subscription,
    store: Arc<ConsumerStore>,
    state: Arc<Mutex<ConsumerState>>,
    shutdown: CancellationToken,
    settings: IngestSettings,
) {
    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = collector::collect(&mut subscription, settings.batch_size, settings.batch_window) => batch,
        };

        match batch {
            Ok(collected) => {
                let ended = collected.completion == Completion::StreamEnded;
                if !collected.is_empty() {
                    store.ingest(collected.messages);
                }
                if ended {
                    error!("Subscription stream ended unexpectedly");
                    mark_failed(&state);
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Ingestion failed; consumer marked as failed");
                mark_failed(&state);
                break;
            }
        }
    }

    subscription.close(settings.close_timeout).await;
}

// a concurrent disconnect has already moved the state to Stopped
fn mark_failed(state: &Mutex<ConsumerState>) {
    let mut state = state.lock();
    if *state == ConsumerState::Running {
        *state = ConsumerState::Failed;
    }
}
