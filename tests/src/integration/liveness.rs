//! # Liveness Scenarios
//!
//! Heartbeats arrive on `ECHOTRACE/health/<node>`; liveness is derived on
//! read from the age of the newest one.

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use crate::harness::{config, node, start_time, TestHub};
    use serde_json::json;
    use shared_bus::{FaultPlan, TopicKind};
    use shared_types::{EventKind, LivenessClass};

    fn liveness(hub: &TestHub, id: &str) -> LivenessClass {
        hub.controller()
            .get_node_states()
            .into_iter()
            .find(|s| s.node_id == node(id))
            .map(|s| s.liveness)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_bands() {
        let hub = TestHub::start(config(4, 1)).await;
        assert_eq!(liveness(&hub, "whisper-1"), LivenessClass::Offline);

        hub.heartbeat("whisper-1").await;
        hub.routed(1).await;

        hub.clock.advance(ChronoDuration::seconds(9));
        assert_eq!(liveness(&hub, "whisper-1"), LivenessClass::Online);
        hub.clock.advance(ChronoDuration::seconds(21));
        assert_eq!(liveness(&hub, "whisper-1"), LivenessClass::Stale);
        hub.clock.advance(ChronoDuration::seconds(30));
        assert_eq!(liveness(&hub, "whisper-1"), LivenessClass::Offline);

        let counts = hub.controller().get_overview().liveness;
        assert_eq!(counts.offline, 2);
        assert_eq!(counts.online + counts.stale, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replayed_heartbeats_absorbed() {
        let hub = TestHub::start(config(4, 1)).await;
        let sent = start_time().timestamp() as f64;
        hub.bus.set_plan(FaultPlan::duplicating(2));
        hub.send(TopicKind::Health, "whisper-1", json!({"ts": sent})).await;
        hub.routed(3).await;

        assert_eq!(hub.count(EventKind::HeartbeatReceived), 1);
        let status = hub
            .controller()
            .get_node_states()
            .into_iter()
            .find(|s| s.node_id == node("whisper-1"))
            .unwrap();
        assert_eq!(status.heartbeats, 1);
        assert_eq!(status.last_heartbeat, Some(start_time()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_heartbeat_keeps_newest() {
        let hub = TestHub::start(config(4, 1)).await;
        let t0 = start_time().timestamp() as f64;
        hub.send(TopicKind::Health, "whisper-1", json!({"ts": t0})).await;
        hub.routed(1).await;
        hub.send(TopicKind::Health, "whisper-1", json!({"ts": t0 - 20.0})).await;
        hub.routed(2).await;

        hub.clock.advance(ChronoDuration::seconds(5));
        assert_eq!(liveness(&hub, "whisper-1"), LivenessClass::Online);
        assert_eq!(hub.count(EventKind::HeartbeatReceived), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_node_heartbeat_ignored() {
        let hub = TestHub::start(config(4, 1)).await;
        hub.send(TopicKind::Health, "stranger", json!({"role": "whisper"})).await;
        hub.routed(1).await;

        assert_eq!(hub.runtime.router_stats().rejected(), 1);
        assert_eq!(hub.controller().get_node_states().len(), 2);
        assert_eq!(hub.count(EventKind::HeartbeatReceived), 0);
    }
}
