//! # Config Push Scenarios
//!
//! ```text
//! controller ──push──▶ ECHOTRACE/config/<node> ──▶ node
//!      ▲                                            │
//!      └── acked / timed_out ◀── ECHOTRACE/ack/<node>
//! ```

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::harness::{config, node, spawn_acking_node, TestHub};
    use et_03_config_dispatch::{
        AccessibilityProfile, AccessibilitySettings, ConfigDispatchApi, DispatchError, PushStatus,
    };
    use serde_json::json;
    use shared_bus::{FaultPlan, TopicKind};
    use shared_types::EventKind;

    #[tokio::test(start_paused = true)]
    async fn test_ack_before_deadline_never_times_out() {
        let hub = TestHub::start(config(4, 2)).await;
        let _node = spawn_acking_node(hub.bus.clone(), "whisper-1");

        let results = hub
            .controller()
            .push_and_wait(&[node("whisper-1")], json!({"audio": {"volume": 0.8}}))
            .await
            .unwrap();
        assert_eq!(results[0].1, Ok(PushStatus::Acked));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hub.count(EventKind::ConfigPushOk), 1);
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 0);

        let ok = &hub.events(EventKind::ConfigPushOk)[0];
        assert_eq!(ok.detail["status"], "ok");
        assert_eq!(ok.detail["applied"], json!(["audio"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_node_times_out_once_then_recovers() {
        let hub = TestHub::start(config(4, 2)).await;
        let container = hub.runtime.container();
        let dispatcher = &container.dispatcher;

        let pushed = hub
            .controller()
            .push_config(&[node("whisper-1")], json!({"accessibility": {"captions": true}}))
            .await
            .unwrap();
        let ticket = pushed[0].1.clone().unwrap();
        assert_eq!(dispatcher.wait_for(ticket.correlation_id).await, Ok(PushStatus::TimedOut));
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 1);

        // A late ack is logged and changes nothing.
        hub.send(
            TopicKind::Ack,
            "whisper-1",
            json!({"correlation_id": ticket.correlation_id}),
        )
        .await;
        hub.routed(1).await;
        assert_eq!(
            dispatcher.status(&ticket.correlation_id).unwrap().status,
            PushStatus::TimedOut
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 1);
        assert_eq!(hub.count(EventKind::ConfigPushOk), 0);

        // The node comes back; a fresh push is independent of the old one.
        let _node = spawn_acking_node(hub.bus.clone(), "whisper-1");
        let results = hub
            .controller()
            .push_and_wait(&[node("whisper-1")], json!({"accessibility": {"captions": true}}))
            .await
            .unwrap();
        assert_eq!(results[0].1, Ok(PushStatus::Acked));
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 1);
        assert_eq!(hub.count(EventKind::ConfigPushOk), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodes_resolve_independently() {
        let hub = TestHub::start(config(4, 3)).await;
        let _w1 = spawn_acking_node(hub.bus.clone(), "whisper-1");
        let _w3 = spawn_acking_node(hub.bus.clone(), "whisper-3");

        let targets = [node("whisper-1"), node("whisper-2"), node("whisper-3"), node("ghost")];
        let results = hub
            .controller()
            .push_and_wait(&targets, json!({"proximity": {"min_mm": 100, "max_mm": 900}}))
            .await
            .unwrap();

        let status = |id: &str| {
            results
                .iter()
                .find(|(n, _)| n.as_str() == id)
                .map(|(_, s)| s.clone())
                .unwrap()
        };
        assert_eq!(status("whisper-1"), Ok(PushStatus::Acked));
        assert_eq!(status("whisper-2"), Ok(PushStatus::TimedOut));
        assert_eq!(status("whisper-3"), Ok(PushStatus::Acked));
        assert!(matches!(status("ghost"), Err(DispatchError::Validation(_))));
        assert_eq!(hub.count(EventKind::ConfigPushOk), 2);
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partitioned_acks_time_out() {
        let hub = TestHub::start(config(4, 1)).await;
        let _node = spawn_acking_node(hub.bus.clone(), "whisper-1");
        hub.bus.set_plan(FaultPlan::dropping(TopicKind::Ack.wildcard()));

        let results = hub
            .controller()
            .push_and_wait(&[node("whisper-1")], json!({"audio": {"fragment_file": "a.wav"}}))
            .await
            .unwrap();
        assert_eq!(results[0].1, Ok(PushStatus::TimedOut));
        assert!(hub.bus.dropped() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicated_acks_resolve_once() {
        let hub = TestHub::start(config(4, 1)).await;
        let _node = spawn_acking_node(hub.bus.clone(), "whisper-1");
        hub.bus.set_plan(FaultPlan::duplicating_on(3, TopicKind::Ack.wildcard()));

        let results = hub
            .controller()
            .push_and_wait(&[node("whisper-1")], json!({"audio": {"volume": 0.2}}))
            .await
            .unwrap();
        assert_eq!(results[0].1, Ok(PushStatus::Acked));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hub.count(EventKind::ConfigPushOk), 1);
        assert_eq!(hub.count(EventKind::ConfigPushTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_publish_is_not_pending() {
        let hub = TestHub::start(config(4, 1)).await;
        hub.bus.set_plan(FaultPlan::rejecting(TopicKind::Config.wildcard()));

        let pushed = hub
            .controller()
            .push_config(&[node("whisper-1")], json!({"audio": {"volume": 0.5}}))
            .await
            .unwrap();
        assert!(matches!(pushed[0].1, Err(DispatchError::Transport(_))));
        assert_eq!(hub.controller().get_overview().pending_pushes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessibility_profile_round_trip() {
        let hub = TestHub::start(config(4, 2)).await;
        let _w1 = spawn_acking_node(hub.bus.clone(), "whisper-1");
        let _w2 = spawn_acking_node(hub.bus.clone(), "whisper-2");
        let _m = spawn_acking_node(hub.bus.clone(), "mystery");

        let mut profile = AccessibilityProfile::default();
        profile.presets.insert(
            "low-vision".into(),
            AccessibilitySettings { visual_pulse: Some(true), captions: Some(true), ..Default::default() },
        );
        profile.apply_preset("low-vision").unwrap();

        let first = hub.controller().apply_accessibility_profile(profile.clone()).await.unwrap();
        assert_eq!(first.len(), 3);
        let container = hub.runtime.container();
        let dispatcher = &container.dispatcher;
        for (_, ticket) in &first {
            let ticket = ticket.clone().unwrap();
            assert_eq!(dispatcher.wait_for(ticket.correlation_id).await, Ok(PushStatus::Acked));
        }

        profile.set_override(
            node("mystery"),
            &AccessibilitySettings { pace: Some(0.9), ..Default::default() },
        );
        let second = hub.controller().apply_accessibility_profile(profile).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, node("mystery"));
    }
}
