use std::time::Instant;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use crate::dashboard::models::messages::{MessagesMetadata, MessagesQuery, MessagesResponse, TopicConsumerStatus};
use crate::error::ViewerError;
use crate::kafka::merge;
use crate::ViewerEngine;

/// `GET /messages`: the most recent messages of one consumed topic, served
/// from the poller's buffer and ordered newest-first by broker timestamp.
pub async fn get_messages(
    State(engine): State<ViewerEngine>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<MessagesResponse>, ViewerError> {
    let started = Instant::now();
    let Query(query) = query.map_err(|rejection| ViewerError::InvalidRequest(rejection.body_text()))?;
    let consumer = &engine.consumer;
    let config = consumer.config();

    let topic = match query.topic.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        Some(topic) => topic,
        None => consumer
            .topics()
            .first()
            .cloned()
            .ok_or_else(|| ViewerError::InvalidRequest("topic is required".to_string()))?,
    };

    if !consumer.tracks(&topic) {
        return Err(ViewerError::TopicNotTracked(topic));
    }

    let max = query.max_messages.unwrap_or(config.default_max_messages);
    if max == 0 {
        return Err(ViewerError::InvalidRequest("maxMessages must be at least 1".to_string()));
    }
    let max = max.min(config.buffer_capacity);

    // a restart runs in the background; this read is served from the buffer
    if consumer.ensure_running().is_some() {
        tracing::debug!(topic = %topic, "Consumer restart scheduled");
    }

    let messages = merge::merge(consumer.get_messages(&topic, max), max);

    let metadata = if query.include_metadata.unwrap_or(false) {
        let topic_metadata = engine.metadata.fetch(&topic).await?;
        Some(MessagesMetadata {
            topic: topic_metadata,
            request_duration: started.elapsed().as_millis() as u64,
            consumer_group: consumer.group_id().to_string(),
            timestamp: Utc::now(),
        })
    } else {
        None
    };

    tracing::debug!(topic = %topic, returned = messages.len(), "Served messages");

    Ok(Json(MessagesResponse {
        message_count: messages.len(),
        messages,
        consumer_status: TopicConsumerStatus {
            is_running: consumer.is_running(),
            last_updated: consumer.last_updated(&topic),
            total_messages: consumer.buffered(&topic),
            available_topics: consumer.topics().to_vec(),
        },
        metadata,
        topic,
    }))
}
