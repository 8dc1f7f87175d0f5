use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::dashboard::models::status::{ConsumerSummary, StatusResponse};
use crate::ViewerEngine;

/// `GET /status`: poller state and per-topic buffer counts.
pub async fn get_status(State(engine): State<ViewerEngine>) -> Json<StatusResponse> {
    let status = engine.consumer.status();

    Json(StatusResponse {
        status: "ok",
        consumer: ConsumerSummary {
            is_running: status.is_running(),
            state: format!("{:?}", status.state).to_lowercase(),
            group_id: status.group_id,
            available_topics: status.topics,
            last_updated: status.last_updated,
            message_count: status.message_count,
            total_messages: status.total_messages,
        },
        timestamp: Utc::now(),
    })
}
