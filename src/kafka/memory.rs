//! In-memory broker: partitioned, offset-addressed topics held in a map.
//! Behaves like a single Kafka node closely enough for the poller and the
//! dashboard to run against it (tests, local UI work).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::error::{Result, ViewerError};
use crate::kafka::message::{parse_headers, Message};
use crate::kafka::offsets::{PartitionStart, PartitionWatermarks};
use crate::kafka::{Broker, Subscription};

#[derive(Default)]
struct MemoryPartition {
    low: i64,
    records: Vec<Message>,
}

impl MemoryPartition {
    fn high(&self) -> i64 {
        self.low + self.records.len() as i64
    }

    fn get(&self, offset: i64) -> Option<&Message> {
        if offset < self.low {
            return self.records.first();
        }
        self.records.get((offset - self.low) as usize)
    }
}

struct Inner {
    topics: Mutex<HashMap<String, Vec<MemoryPartition>>>,
    pending_failures: Mutex<VecDeque<ViewerError>>,
    unavailable: Mutex<Option<String>>,
    last_starts: Mutex<Vec<PartitionStart>>,
    subscribe_gate: Mutex<Option<Arc<Notify>>>,
    version: watch::Sender<u64>,
    opened: AtomicUsize,
    released: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                pending_failures: Mutex::new(VecDeque::new()),
                unavailable: Mutex::new(None),
                last_starts: Mutex::new(Vec::new()),
                subscribe_gate: Mutex::new(None),
                version,
                opened: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    pub fn create_topic(&self, name: &str, partitions: usize) {
        let mut topics = self.inner.topics.lock();
        topics
            .entry(name.to_string())
            .or_insert_with(|| (0..partitions).map(|_| MemoryPartition::default()).collect());
    }

    /// Appends a record and returns its offset.
    pub fn produce(&self, topic: &str, partition: i32, timestamp: i64, value: &str) -> Result<i64> {
        self.produce_with_headers(topic, partition, timestamp, None, value, &[])
    }

    pub fn produce_with_headers(
        &self,
        topic: &str,
        partition: i32,
        timestamp: i64,
        key: Option<&str>,
        value: &str,
        headers: &[(&str, Option<&[u8]>)],
    ) -> Result<i64> {
        let offset = {
            let mut topics = self.inner.topics.lock();
            let partitions = topics
                .get_mut(topic)
                .ok_or_else(|| ViewerError::TopicNotFound(topic.to_string()))?;
            let log = partitions
                .get_mut(partition as usize)
                .ok_or_else(|| ViewerError::InvalidRequest(format!("partition {partition} does not exist")))?;
            let offset = log.high();
            log.records.push(Message {
                topic: topic.to_string(),
                partition,
                offset,
                timestamp,
                key: key.map(|k| Bytes::copy_from_slice(k.as_bytes())),
                value: Some(Bytes::copy_from_slice(value.as_bytes())),
                headers: parse_headers(headers.iter().copied()),
            });
            offset
        };
        self.inner.version.send_modify(|v| *v += 1);
        Ok(offset)
    }

    /// Drops records below `offset`, like retention would.
    pub fn truncate_before(&self, topic: &str, partition: i32, offset: i64) {
        let mut topics = self.inner.topics.lock();
        if let Some(log) = topics.get_mut(topic).and_then(|p| p.get_mut(partition as usize)) {
            let drop_count = (offset - log.low).clamp(0, log.records.len() as i64) as usize;
            log.records.drain(..drop_count);
            log.low += drop_count as i64;
        }
    }

    /// The next record pulled by any open subscription is this error instead.
    pub fn inject_stream_failure(&self, error: ViewerError) {
        self.inner.pending_failures.lock().push_back(error);
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// While set, metadata and subscribe calls fail with a connection error.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.inner.unavailable.lock() = reason.map(str::to_string);
    }

    /// The next `subscribe` call waits until the returned gate is notified.
    pub fn hold_next_subscription(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.subscribe_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn last_subscription_starts(&self) -> Vec<PartitionStart> {
        self.inner.last_starts.lock().clone()
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn subscriptions_released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        match self.inner.unavailable.lock().as_ref() {
            Some(reason) => Err(ViewerError::Connection(reason.clone())),
            None => Ok(()),
        }
    }
}

struct Cursor {
    topic: String,
    partition: i32,
    next: i64,
}

struct StreamState {
    inner: Arc<Inner>,
    cursors: Vec<Cursor>,
    turn: usize,
    changes: watch::Receiver<u64>,
}

impl StreamState {
    /// Round-robin over partitions so records interleave the way a real
    /// fetch across several partitions does.
    fn poll_record(&mut self) -> Option<Message> {
        let topics = self.inner.topics.lock();
        let count = self.cursors.len();
        for step in 0..count {
            let idx = (self.turn + step) % count;
            let cursor = &mut self.cursors[idx];
            let found = topics
                .get(&cursor.topic)
                .and_then(|p| p.get(cursor.partition as usize))
                .and_then(|log| log.get(cursor.next))
                .cloned();
            if let Some(message) = found {
                cursor.next = message.offset + 1;
                self.turn = (idx + 1) % count;
                return Some(message);
            }
        }
        None
    }

    async fn next(mut self) -> Option<(Result<Message>, Self)> {
        loop {
            self.changes.borrow_and_update();
            let failure = self.inner.pending_failures.lock().pop_front();
            if let Some(error) = failure {
                return Some((Err(error), self));
            }
            if let Some(message) = self.poll_record() {
                return Some((Ok(message), self));
            }
            if self.changes.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Broker for MemoryBroker {
    fn fetch_watermarks<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, Result<Vec<PartitionWatermarks>>> {
        async move {
            self.check_available()?;
            let topics = self.inner.topics.lock();
            let partitions = topics
                .get(topic)
                .ok_or_else(|| ViewerError::TopicNotFound(topic.to_string()))?;
            Ok(partitions
                .iter()
                .enumerate()
                .map(|(id, log)| PartitionWatermarks::new(id as i32, log.low, log.high()))
                .collect())
        }
        .boxed()
    }

    fn subscribe<'a>(&'a self, group_id: &'a str, starts: Vec<PartitionStart>) -> BoxFuture<'a, Result<Subscription>> {
        async move {
            let gate = self.inner.subscribe_gate.lock().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.check_available()?;
            {
                let topics = self.inner.topics.lock();
                for start in &starts {
                    if !topics.contains_key(&start.topic) {
                        return Err(ViewerError::TopicNotFound(start.topic.clone()));
                    }
                }
            }

            tracing::debug!(group_id = %group_id, partitions = starts.len(), "Memory subscription opened");
            *self.inner.last_starts.lock() = starts.clone();
            self.inner.opened.fetch_add(1, Ordering::SeqCst);

            let state = StreamState {
                inner: self.inner.clone(),
                cursors: starts
                    .into_iter()
                    .map(|s| Cursor { topic: s.topic, partition: s.partition, next: s.offset })
                    .collect(),
                turn: 0,
                changes: self.inner.version.subscribe(),
            };
            let records = stream::unfold(state, StreamState::next).boxed();

            let inner = self.inner.clone();
            Ok(Subscription::new(records, move || {
                inner.released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }
        .boxed()
    }
}
