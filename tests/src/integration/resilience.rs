//! # Resilience Scenarios
//!
//! Untrusted input, broker outages and shutdown.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::harness::{config, node, whispers, TestHub};
    use et_03_config_dispatch::ConfigDispatchApi;
    use shared_bus::{BusMessage, FaultPlan, MessageBus, TopicKind};
    use shared_types::EventKind;

    #[tokio::test(start_paused = true)]
    async fn test_malformed_traffic_is_dropped() {
        let hub = TestHub::start(config(2, 2)).await;
        let garbage = [
            BusMessage::new("ECHOTRACE/trigger/whisper-1", "{not json"),
            BusMessage::new("ECHOTRACE/trigger/whisper-1", "42"),
            BusMessage::new("ECHOTRACE/trigger/whisper-1", r#"{"node_id": "whisper-2"}"#),
            BusMessage::new("ECHOTRACE/health/whisper-1", r#"{"ts": "yesterday"}"#),
            BusMessage::new("ECHOTRACE/ack/whisper-1", r#"{"status": "ok"}"#),
            BusMessage::new("ECHOTRACE/ack/whisper-1", r#"{"correlation_id": "nope"}"#),
        ];
        for message in garbage.iter().cloned() {
            hub.bus.publish(message).await.unwrap();
        }
        hub.routed(garbage.len() as u64).await;
        assert_eq!(hub.runtime.router_stats().malformed(), garbage.len() as u64);

        // The hub still works.
        for id in whispers(2) {
            hub.trigger(&id).await;
        }
        hub.routed(garbage.len() as u64 + 2).await;
        assert!(hub.controller().get_overview().session.unlocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_trigger_then_redelivery() {
        let hub = TestHub::start(config(2, 2)).await;
        hub.bus.set_plan(FaultPlan::dropping(TopicKind::Trigger.wildcard()));
        hub.trigger("whisper-1").await;
        hub.trigger("whisper-2").await;
        assert_eq!(hub.bus.dropped(), 2);

        hub.bus.set_plan(FaultPlan::default());
        hub.trigger("whisper-2").await;
        hub.trigger("whisper-1").await;
        hub.routed(2).await;
        assert!(hub.controller().get_overview().session.unlocked);
        assert_eq!(hub.count(EventKind::NarrativeUnlocked), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_over_a_session() {
        let hub = TestHub::start(config(2, 2)).await;
        hub.trigger("whisper-1").await;
        hub.routed(1).await;
        hub.clock.advance(chrono::Duration::seconds(30));
        hub.trigger("whisper-2").await;
        hub.heartbeat("whisper-1").await;
        hub.routed(3).await;

        let summary = hub.controller().summarize(None);
        assert_eq!(summary.total_triggers, 2);
        assert_eq!(summary.by_node["whisper-1"], 1);
        assert_eq!(summary.heartbeat_by_node["whisper-1"], 1);
        assert_eq!(summary.narrative_unlocks, 1);
        assert!((summary.mean_trigger_interval_seconds - 30.0).abs() < f64::EPSILON);
        assert!((summary.completion_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_pushes_silently() {
        let hub = TestHub::start(config(4, 1)).await;
        hub.controller()
            .push_config(&[node("whisper-1")], serde_json::json!({"audio": {"volume": 1.0}}))
            .await
            .unwrap();
        let container = hub.runtime.container();
        assert_eq!(container.dispatcher.pending_count(), 1);

        container.dispatcher.shutdown().await;
        assert_eq!(container.dispatcher.pending_count(), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 0);

        let refused = hub
            .controller()
            .push_config(&[node("whisper-1")], serde_json::json!({"audio": {"volume": 1.0}}))
            .await
            .unwrap();
        assert!(refused[0].1.is_err());
    }

    #[tokio::test]
    async fn test_runtime_shutdown_stops_routing() {
        let hub = TestHub::start(config(2, 2)).await;
        hub.trigger("whisper-1").await;
        hub.routed(1).await;

        hub.runtime.shutdown().await;
        assert!(hub.runtime.container().event_log.is_closed());

        hub.trigger("whisper-2").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.runtime.router_stats().routed(), 1);
        assert!(!hub.controller().get_overview().session.unlocked);
    }
}
