pub mod config;
pub mod consumer;
pub mod dashboard;
pub mod error;
pub mod kafka;

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use crate::config::ConsumerConfig;
use crate::consumer::ConsumerService;
use crate::kafka::metadata::TopicMetadataReader;
use crate::kafka::Broker;

// ========================================
// ENGINE (The Singleton)
// ========================================

/// Everything the HTTP handlers need. Built once in `main` and handed to the
/// router as state; cheap to clone (all fields are Arcs).
#[derive(Clone)]
pub struct ViewerEngine {
    pub consumer: Arc<ConsumerService>,
    pub metadata: TopicMetadataReader,
    pub start_time: Instant,
}

impl ViewerEngine {
    /// `client_id` prefixes the consumer group, which is unique per process.
    pub fn new(broker: Arc<dyn Broker>, topics: Vec<String>, client_id: &str, config: ConsumerConfig) -> Self {
        let group_id = format!("{}-{}", client_id, Uuid::new_v4().simple());
        Self {
            consumer: Arc::new(ConsumerService::new(broker.clone(), topics, group_id, config)),
            metadata: TopicMetadataReader::new(broker),
            start_time: Instant::now(),
        }
    }
}
