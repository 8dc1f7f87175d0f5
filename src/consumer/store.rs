//! Per-topic ring buffers of recently ingested messages.
//!
//! Only the ingestion task writes. A batch for one topic is applied while
//! holding that topic's map entry, so readers see either the whole batch or
//! none of it. Reads hand out copies.
//!
//! Each buffer remembers the next expected offset per partition, so records
//! delivered twice (after a restart, for instance) are dropped.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::kafka::message::Message;

struct TopicBuffer {
    // newest at the front
    messages: VecDeque<Message>,
    next_offsets: HashMap<i32, i64>,
    last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreSnapshot {
    pub last_updated: BTreeMap<String, DateTime<Utc>>,
    pub message_count: BTreeMap<String, usize>,
}

impl StoreSnapshot {
    pub fn total_messages(&self) -> usize {
        self.message_count.values().sum()
    }
}

pub struct ConsumerStore {
    topics: DashMap<String, TopicBuffer>,
    capacity: usize,
}

impl ConsumerStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepends every new message of the batch in arrival order and evicts
    /// the oldest entries beyond capacity.
    pub fn ingest(&self, batch: Vec<Message>) {
        let mut by_topic: HashMap<String, Vec<Message>> = HashMap::new();
        for message in batch {
            by_topic.entry(message.topic.clone()).or_default().push(message);
        }

        let now = Utc::now();
        for (topic, messages) in by_topic {
            let mut entry = self.topics.entry(topic.clone()).or_insert_with(|| TopicBuffer {
                messages: VecDeque::with_capacity(self.capacity.min(1024)),
                next_offsets: HashMap::new(),
                last_updated: now,
            });
            let buffer = &mut *entry;

            let mut duplicates = 0usize;
            for message in messages {
                let next = buffer.next_offsets.entry(message.partition).or_insert(i64::MIN);
                if message.offset < *next {
                    duplicates += 1;
                    continue;
                }
                *next = message.offset + 1;
                buffer.messages.push_front(message);
            }
            buffer.messages.truncate(self.capacity);
            buffer.last_updated = now;

            if duplicates > 0 {
                tracing::debug!(topic = %topic, duplicates, "Dropped already ingested records");
            }
            tracing::trace!(topic = %topic, buffered = buffer.messages.len(), "Batch ingested");
        }
    }

    /// Up to `max` of the most recently ingested messages, newest first.
    pub fn get_messages(&self, topic: &str, max: usize) -> Vec<Message> {
        self.topics
            .get(topic)
            .map(|buffer| buffer.messages.iter().take(max).cloned().collect())
            .unwrap_or_default()
    }

    /// Offset right after the last record ingested from this partition.
    pub fn resume_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.topics.get(topic).and_then(|b| b.next_offsets.get(&partition).copied())
    }

    pub fn len(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|b| b.messages.len()).unwrap_or(0)
    }

    pub fn last_updated(&self, topic: &str) -> Option<DateTime<Utc>> {
        self.topics.get(topic).map(|b| b.last_updated)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::default();
        for entry in self.topics.iter() {
            snapshot.last_updated.insert(entry.key().clone(), entry.last_updated);
            snapshot.message_count.insert(entry.key().clone(), entry.messages.len());
        }
        snapshot
    }
}
