use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kafka::message::Message;
use crate::kafka::offsets::TopicMetadata;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub topic: Option<String>,
    pub max_messages: Option<usize>,
    pub include_metadata: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub topic: String,
    pub message_count: usize,
    pub messages: Vec<Message>,
    pub consumer_status: TopicConsumerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessagesMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConsumerStatus {
    pub is_running: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// Messages currently buffered for the requested topic.
    pub total_messages: usize,
    pub available_topics: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesMetadata {
    #[serde(flatten)]
    pub topic: TopicMetadata,
    /// Milliseconds spent serving the request.
    pub request_duration: u64,
    pub consumer_group: String,
    pub timestamp: DateTime<Utc>,
}
