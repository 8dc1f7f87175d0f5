use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub consumer: ConsumerSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSummary {
    pub is_running: bool,
    pub state: String,
    pub group_id: String,
    pub available_topics: Vec<String>,
    pub last_updated: BTreeMap<String, DateTime<Utc>>,
    pub message_count: BTreeMap<String, usize>,
    pub total_messages: usize,
}
