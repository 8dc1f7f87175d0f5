use std::process::ExitCode;
use std::sync::Arc;

use topic_viewer::config::Config;
use topic_viewer::dashboard::server::{start_dashboard_server, wait_for_shutdown};
use topic_viewer::kafka::rdkafka_broker::KafkaBroker;
use topic_viewer::ViewerEngine;
use tracing_subscriber::EnvFilter;

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("VIEWER_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("🚀 Topic Viewer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(kafka = ?config.kafka, consumer = ?config.consumer, "Configuration loaded");

    let broker = Arc::new(KafkaBroker::new(&config.kafka));
    let engine = ViewerEngine::new(broker, config.kafka.topics.clone(), &config.kafka.client_id, config.consumer.clone());

    // Not fatal: a failed consumer is restarted on the next read.
    if let Err(e) = engine.consumer.start().await {
        tracing::warn!("Consumer not started yet: {}", e);
    }

    let shutdown = wait_for_shutdown(tokio::signal::ctrl_c());
    let served = start_dashboard_server(engine.clone(), &config.server.addr(), shutdown).await;

    engine.consumer.disconnect().await;

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Dashboard server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
