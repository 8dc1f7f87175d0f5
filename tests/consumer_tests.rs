mod helpers;
use helpers::{produce_all, setup_engine, wait_until, TOPIC};
use topic_viewer::consumer::ConsumerState;
use topic_viewer::error::ViewerError;
use topic_viewer::kafka::merge::merge;
use topic_viewer::kafka::offsets::PartitionStart;

// =========================================================================================
// 1. FEATURE TESTS (Happy Path + Logic)
// =========================================================================================

mod features {
    use super::*;

    #[tokio::test]
    async fn test_start_reads_existing_and_new_messages() {
        let (engine, broker) = setup_engine(&[TOPIC], 100);
        broker.create_topic(TOPIC, 1);
        produce_all(&broker, TOPIC, 0, 1_000, &["a", "b", "c"]);

        engine.consumer.start().await.unwrap();
        assert_eq!(engine.consumer.state(), ConsumerState::Running);
        wait_until("initial backlog", || engine.consumer.buffered(TOPIC) == 3).await;

        broker.produce(TOPIC, 0, 2_000, "d").unwrap();
        wait_until("live message", || engine.consumer.buffered(TOPIC) == 4).await;

        let messages = engine.consumer.get_messages(TOPIC, 10);
        let values: Vec<_> = messages.iter().map(|m| m.value_text().unwrap()).collect();
        assert_eq!(values, vec!["d", "c", "b", "a"]);
        assert!(engine.consumer.last_updated(TOPIC).is_some());

        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (engine, broker) = setup_engine(&[TOPIC], 100);
        broker.create_topic(TOPIC, 1);

        engine.consumer.start().await.unwrap();
        engine.consumer.start().await.unwrap();

        assert_eq!(broker.subscriptions_opened(), 1);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_buffer_keeps_newest_up_to_capacity() {
        let (engine, broker) = setup_engine(&[TOPIC], 5);
        broker.create_topic(TOPIC, 1);
        engine.consumer.start().await.unwrap();

        for i in 0..20 {
            broker.produce(TOPIC, 0, i, &format!("m{}", i)).unwrap();
        }
        wait_until("last message ingested", || {
            engine.consumer.get_messages(TOPIC, 1).first().map(|m| m.offset) == Some(19)
        })
        .await;

        let offsets: Vec<i64> = engine.consumer.get_messages(TOPIC, 100).iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![19, 18, 17, 16, 15]);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_start_offsets_cover_most_recent_window() {
        // p0 holds offsets 0..5, p1 holds 0..3, four slots to fill
        let (engine, broker) = setup_engine(&[TOPIC], 4);
        broker.create_topic(TOPIC, 2);
        produce_all(&broker, TOPIC, 0, 100, &["p0-0", "p0-1", "p0-2", "p0-3", "p0-4"]);
        produce_all(&broker, TOPIC, 1, 200, &["p1-0", "p1-1", "p1-2"]);

        engine.consumer.start().await.unwrap();

        let starts = broker.last_subscription_starts();
        assert_eq!(
            starts,
            vec![
                PartitionStart { topic: TOPIC.to_string(), partition: 0, offset: 3 },
                PartitionStart { topic: TOPIC.to_string(), partition: 1, offset: 1 },
            ]
        );

        wait_until("window ingested", || engine.consumer.buffered(TOPIC) == 4).await;

        let merged = merge(engine.consumer.get_messages(TOPIC, 4), 4);
        let values: Vec<_> = merged.iter().map(|m| m.value_text().unwrap()).collect();
        assert_eq!(values, vec!["p1-2", "p1-1", "p0-4", "p0-3"]);

        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_skewed_partitions_still_fill_buffer() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 2);
        for i in 0..100 {
            broker.produce(TOPIC, 0, i, &format!("p0-{}", i)).unwrap();
        }
        broker.produce(TOPIC, 1, 50, "p1-0").unwrap();

        engine.consumer.start().await.unwrap();

        let starts: Vec<(i32, i64)> = broker.last_subscription_starts().iter().map(|s| (s.partition, s.offset)).collect();
        assert_eq!(starts, vec![(0, 91), (1, 0)]);
        wait_until("buffer filled", || engine.consumer.buffered(TOPIC) == 10).await;
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_empty_partition_starts_at_high_watermark() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 2);
        produce_all(&broker, TOPIC, 0, 0, &["only"]);

        engine.consumer.start().await.unwrap();
        let starts = broker.last_subscription_starts();
        assert_eq!(starts[1].partition, 1);
        assert_eq!(starts[1].offset, 0);

        broker.produce(TOPIC, 1, 10, "later").unwrap();
        wait_until("write to empty partition", || engine.consumer.buffered(TOPIC) == 2).await;
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_empty_topic_has_no_messages() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 3);

        engine.consumer.start().await.unwrap();

        assert!(engine.consumer.get_messages(TOPIC, 10).is_empty());
        assert_eq!(engine.consumer.status().total_messages, 0);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_retention_truncated_partition_reads_from_low_watermark() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        produce_all(&broker, TOPIC, 0, 0, &["0", "1", "2", "3", "4", "5"]);
        broker.truncate_before(TOPIC, 0, 4);

        engine.consumer.start().await.unwrap();
        assert_eq!(broker.last_subscription_starts()[0].offset, 4);

        wait_until("remaining records", || engine.consumer.buffered(TOPIC) == 2).await;
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_headers_and_keys_flow_through() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        broker
            .produce_with_headers(
                TOPIC,
                0,
                42,
                Some("behandling-1"),
                "{\"id\":1}",
                &[("type", Some(b"opprettet".as_slice())), ("raw", Some(&[0xde, 0xad][..])), ("none", None)],
            )
            .unwrap();

        engine.consumer.start().await.unwrap();
        wait_until("record", || engine.consumer.buffered(TOPIC) == 1).await;

        let message = &engine.consumer.get_messages(TOPIC, 1)[0];
        assert_eq!(message.key_text().as_deref(), Some("behandling-1"));
        assert_eq!(message.headers["type"].as_deref(), Some("opprettet"));
        assert_eq!(message.headers["raw"].as_deref(), Some("0xdead"));
        assert_eq!(message.headers["none"], None);

        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_releases_subscription() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        engine.consumer.start().await.unwrap();

        engine.consumer.disconnect().await;

        assert_eq!(engine.consumer.state(), ConsumerState::Stopped);
        assert_eq!(broker.subscriptions_released(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_before_start_is_noop() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        engine.consumer.disconnect().await;

        assert_eq!(engine.consumer.state(), ConsumerState::Stopped);
        assert_eq!(broker.subscriptions_released(), 0);
    }

    #[tokio::test]
    async fn test_missing_topic_is_skipped() {
        let (engine, broker) = setup_engine(&[TOPIC, "does-not-exist"], 10);
        broker.create_topic(TOPIC, 1);

        engine.consumer.start().await.unwrap();

        let starts = broker.last_subscription_starts();
        assert!(starts.iter().all(|s| s.topic == TOPIC));
        engine.consumer.disconnect().await;
    }
}

// =========================================================================================
// 2. FAILURE AND RECOVERY
// =========================================================================================

mod recovery {
    use super::*;

    #[tokio::test]
    async fn test_no_known_topics_fails_start() {
        let (engine, _broker) = setup_engine(&["nope"], 10);

        let err = engine.consumer.start().await.unwrap_err();

        assert!(matches!(err, ViewerError::TopicNotFound(_)));
        assert_eq!(engine.consumer.state(), ConsumerState::Failed);
    }

    #[tokio::test]
    async fn test_unavailable_broker_fails_then_recovers() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        broker.set_unavailable(Some("connection refused"));

        let err = engine.consumer.start().await.unwrap_err();
        assert!(matches!(err, ViewerError::Connection(_)));
        assert_eq!(engine.consumer.state(), ConsumerState::Failed);

        // still down: restart attempt is swallowed
        engine.consumer.ensure_running().expect("restart scheduled").await.unwrap();
        assert_eq!(engine.consumer.state(), ConsumerState::Failed);

        broker.set_unavailable(None);
        engine.consumer.ensure_running().expect("restart scheduled").await.unwrap();
        assert_eq!(engine.consumer.state(), ConsumerState::Running);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_stream_failure_marks_failed_and_keeps_buffer() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        produce_all(&broker, TOPIC, 0, 0, &["a", "b"]);
        engine.consumer.start().await.unwrap();
        wait_until("backlog", || engine.consumer.buffered(TOPIC) == 2).await;

        broker.inject_stream_failure(ViewerError::Broker("leader not available".to_string()));
        wait_until("failed state", || engine.consumer.state() == ConsumerState::Failed).await;
        wait_until("released", || broker.subscriptions_released() == 1).await;

        assert_eq!(engine.consumer.get_messages(TOPIC, 10).len(), 2);
    }

    #[tokio::test]
    async fn test_restart_resumes_without_duplicates() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        produce_all(&broker, TOPIC, 0, 0, &["a", "b", "c"]);
        engine.consumer.start().await.unwrap();
        wait_until("backlog", || engine.consumer.buffered(TOPIC) == 3).await;

        broker.inject_stream_failure(ViewerError::Broker("boom".to_string()));
        wait_until("failed state", || engine.consumer.state() == ConsumerState::Failed).await;

        engine.consumer.ensure_running().expect("restart scheduled").await.unwrap();
        assert_eq!(engine.consumer.state(), ConsumerState::Running);
        assert_eq!(broker.subscriptions_opened(), 2);
        assert_eq!(broker.last_subscription_starts()[0].offset, 3);

        broker.produce(TOPIC, 0, 10, "d").unwrap();
        wait_until("post-restart record", || engine.consumer.buffered(TOPIC) == 4).await;

        let offsets: Vec<i64> = engine.consumer.get_messages(TOPIC, 10).iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![3, 2, 1, 0]);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_ensure_running_does_not_start_stopped_consumer() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);

        assert!(engine.consumer.ensure_running().is_none());

        assert_eq!(engine.consumer.state(), ConsumerState::Stopped);
        assert_eq!(broker.subscriptions_opened(), 0);
    }

    #[tokio::test]
    async fn test_ensure_running_returns_before_restart_finishes() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        broker.set_unavailable(Some("down"));
        assert!(engine.consumer.start().await.is_err());
        broker.set_unavailable(None);

        // the broker answers the subscribe only once the gate opens
        let gate = broker.hold_next_subscription();
        let restart = engine.consumer.ensure_running().expect("restart scheduled");
        wait_until("restart in progress", || engine.consumer.state() == ConsumerState::Starting).await;
        assert!(engine.consumer.get_messages(TOPIC, 10).is_empty());

        gate.notify_one();
        restart.await.unwrap();
        assert_eq!(engine.consumer.state(), ConsumerState::Running);
        engine.consumer.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_during_start_wins() {
        let (engine, broker) = setup_engine(&[TOPIC], 10);
        broker.create_topic(TOPIC, 1);
        let gate = broker.hold_next_subscription();

        let consumer = engine.consumer.clone();
        let starting = tokio::spawn(async move { consumer.start().await });
        wait_until("start in progress", || engine.consumer.state() == ConsumerState::Starting).await;

        engine.consumer.disconnect().await;
        gate.notify_one();
        starting.await.unwrap().unwrap();

        assert_eq!(engine.consumer.state(), ConsumerState::Stopped);
        assert_eq!(broker.subscriptions_opened(), 1);
        assert_eq!(broker.subscriptions_released(), 1);

        // nothing is ingesting anymore
        broker.produce(TOPIC, 0, 1, "late").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(engine.consumer.buffered(TOPIC), 0);
    }
}
