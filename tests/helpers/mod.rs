#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use topic_viewer::config::ConsumerConfig;
use topic_viewer::kafka::memory::MemoryBroker;
use topic_viewer::ViewerEngine;

pub const TOPIC: &str = "speilvendt.spillerom-behandlinger";

pub fn small_config(capacity: usize) -> ConsumerConfig {
    ConsumerConfig {
        buffer_capacity: capacity,
        batch_size: 50,
        batch_window_ms: 10,
        close_timeout_ms: 500,
        default_max_messages: 100,
    }
}

/// Engine over a fresh in-memory broker; the consumer is not started.
pub fn setup_engine(topics: &[&str], capacity: usize) -> (ViewerEngine, MemoryBroker) {
    let broker = MemoryBroker::new();
    let engine = ViewerEngine::new(
        Arc::new(broker.clone()),
        topics.iter().map(|t| t.to_string()).collect(),
        "test-viewer",
        small_config(capacity),
    );
    (engine, broker)
}

/// Polls `check` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Produces `values` to one partition with timestamps `base, base+1, ...`.
pub fn produce_all(broker: &MemoryBroker, topic: &str, partition: i32, base: i64, values: &[&str]) {
    for (i, value) in values.iter().enumerate() {
        broker.produce(topic, partition, base + i as i64, value).unwrap();
    }
}

pub struct HttpReply {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Serves `router(engine)` on an ephemeral port and returns its address.
pub async fn serve(engine: ViewerEngine) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, topic_viewer::dashboard::server::router(engine)).await.unwrap();
    });
    addr
}

/// Plain HTTP/1.1 GET over a fresh connection.
pub async fn http_get(addr: std::net::SocketAddr, path: &str) -> HttpReply {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", path, addr);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8_lossy(&raw).into_owned();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines.next().unwrap().split_whitespace().nth(1).unwrap().parse().unwrap();
    let content_type = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default();

    HttpReply { status, content_type, body: body.to_string() }
}
