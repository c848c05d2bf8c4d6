//! # Narrative Unlock Scenarios
//!
//! ```text
//! whisper-N ──trigger──▶ hub ──(unique == threshold)──▶ unlock ──▶ mystery
//!                          └──▶ ECHOTRACE/state/hub (retained)
//! ```

#[cfg(test)]
mod tests {
    use crate::harness::{config, eventually, whispers, TestHub, MYSTERY, SESSION};
    use et_02_narrative::NarrativeState;
    use serde_json::json;
    use shared_bus::{FaultPlan, OutboundCommand, TopicKind, TopicPattern};
    use shared_types::EventKind;

    #[tokio::test(start_paused = true)]
    async fn test_four_whispers_unlock_once() {
        let hub = TestHub::start(config(4, 4)).await;
        let mut unlocks = hub.observe(TopicKind::Unlock.wildcard());

        // Reverse order, every trigger delivered three times.
        hub.bus.set_plan(FaultPlan::duplicating_on(2, TopicKind::Trigger.wildcard()));
        for id in whispers(4).iter().rev() {
            hub.trigger(id).await;
        }
        hub.routed(12).await;

        let overview = hub.controller().get_overview();
        assert!(overview.session.unlocked);
        assert_eq!(overview.session.unique_count, 4);
        assert_eq!(hub.count(EventKind::NarrativeUnlocked), 1);

        let sent = unlocks.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, format!("ECHOTRACE/unlock/{MYSTERY}"));
        match OutboundCommand::decode(&sent[0]).unwrap() {
            OutboundCommand::Unlock { session_id, .. } => assert_eq!(session_id.as_str(), SESSION),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_whisper_repeating_never_unlocks() {
        let hub = TestHub::start(config(4, 4)).await;
        for _ in 0..5 {
            hub.trigger("whisper-1").await;
        }
        hub.routed(5).await;

        let session = hub.controller().get_overview().session;
        assert!(!session.unlocked);
        assert_eq!(session.unique_count, 1);
        assert_eq!(session.state, NarrativeState::Accumulating);
        assert_eq!(hub.count(EventKind::NarrativeUnlocked), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_second_unlock() {
        let hub = TestHub::start(config(2, 2)).await;
        let mut unlocks = hub.observe(TopicKind::Unlock.wildcard());

        hub.trigger("whisper-1").await;
        hub.trigger("whisper-2").await;
        hub.routed(2).await;
        assert!(hub.controller().get_overview().session.unlocked);

        // Unlocked sessions refuse triggers until reset.
        hub.trigger("whisper-1").await;
        hub.routed(3).await;
        assert_eq!(hub.runtime.router_stats().rejected(), 1);

        hub.controller().reset_narrative().await.unwrap();
        let session = hub.controller().get_overview().session;
        assert_eq!(session.state, NarrativeState::Idle);
        assert!(session.triggered.is_empty());

        hub.trigger("whisper-2").await;
        hub.trigger("whisper-1").await;
        hub.routed(5).await;
        assert!(hub.controller().get_overview().session.unlocked);
        assert_eq!(hub.count(EventKind::NarrativeUnlocked), 2);
        assert_eq!(unlocks.drain().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_state_is_retained() {
        let hub = TestHub::start(config(2, 2)).await;
        hub.trigger("whisper-1").await;
        hub.routed(1).await;

        // A late subscriber still learns the current state.
        let mut state = hub.observe(TopicPattern::exact("ECHOTRACE/state/hub"));
        eventually(|| !state.drain().is_empty()).await;
        let retained = hub.bus.inner().retained("ECHOTRACE/state/hub").unwrap();
        match OutboundCommand::decode(&retained).unwrap() {
            OutboundCommand::HubState(payload) => {
                assert!(!payload.unlocked);
                assert_eq!(payload.threshold, 2);
                assert_eq!(payload.triggered.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_delivery_failure_keeps_decision() {
        let hub = TestHub::start(config(1, 1)).await;
        hub.bus.set_plan(FaultPlan::rejecting(TopicKind::Unlock.wildcard()));

        hub.send(TopicKind::Trigger, "whisper-1", json!({"fragment_id": "intro"})).await;
        hub.routed(1).await;

        assert!(hub.controller().get_overview().session.unlocked);
        assert_eq!(hub.count(EventKind::NarrativeUnlocked), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_participants_restrict_session() {
        let mut cfg = config(2, 3);
        cfg.narrative.participants = Some(vec!["whisper-1".into(), "whisper-2".into()]);
        let hub = TestHub::start(cfg).await;

        hub.trigger("whisper-3").await;
        hub.trigger("whisper-1").await;
        hub.routed(2).await;
        assert_eq!(hub.controller().get_overview().session.unique_count, 1);

        hub.trigger("whisper-2").await;
        hub.routed(3).await;
        assert!(hub.controller().get_overview().session.unlocked);
    }
}

#[cfg(test)]
mod properties {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use et_02_narrative::{NarrativeApi, NarrativeConfig, NarrativeService, NodeDirectory};
    use proptest::prelude::*;
    use shared_bus::{InMemoryBus, MessageBus, TopicKind};
    use shared_types::{
        EventKind, FragmentId, ManualTimeSource, NodeId, NodeRole, RecordingSink, SessionId,
    };

    struct Roster;

    impl NodeDirectory for Roster {
        fn role_of(&self, node_id: &NodeId) -> Option<NodeRole> {
            match node_id.as_str() {
                "mystery" => Some(NodeRole::Mystery),
                id if id.starts_with("whisper-") => Some(NodeRole::Whisper),
                _ => None,
            }
        }

        fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeId> {
            match role {
                NodeRole::Mystery => vec![NodeId::parse("mystery").unwrap()],
                NodeRole::Whisper => Vec::new(),
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any interleaving of concurrent, duplicated triggers unlocks at
        /// most once, and exactly once when enough distinct nodes fire.
        #[test]
        fn concurrent_triggers_unlock_at_most_once(
            deliveries in prop::collection::vec(1usize..=6, 1..40),
            threshold in 1usize..=6,
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            let (unlocked_events, unlock_messages, unique) = runtime.block_on(async {
                let bus = Arc::new(InMemoryBus::new());
                let mut unlocks = bus.subscribe(TopicKind::Unlock.wildcard());
                let events = Arc::new(RecordingSink::new());
                let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
                let narrative = Arc::new(NarrativeService::new(
                    NarrativeConfig::default(),
                    Arc::new(Roster),
                    bus,
                    Arc::new(ManualTimeSource::new(start)),
                    events.clone(),
                ));
                narrative
                    .activate(SessionId::parse("pack-1").unwrap(), threshold, None)
                    .await
                    .unwrap();

                // One task per delivery so triggers race across worker threads.
                let mut tasks = tokio::task::JoinSet::new();
                for (i, n) in deliveries.iter().enumerate() {
                    let node = NodeId::parse(format!("whisper-{n}")).unwrap();
                    let fragment = FragmentId::parse(format!("f{n}")).unwrap();
                    let at = start + ChronoDuration::milliseconds(i as i64);
                    let narrative = Arc::clone(&narrative);
                    tasks.spawn(async move {
                        narrative.on_fragment_triggered(&node, fragment, at).await
                    });
                }
                while let Some(joined) = tasks.join_next().await {
                    let _ = joined.unwrap();
                }
                (
                    events.count(EventKind::NarrativeUnlocked),
                    unlocks.drain().len(),
                    narrative.snapshot().unique_count,
                )
            });

            let distinct = deliveries.iter().collect::<std::collections::HashSet<_>>().len();
            let expected = usize::from(distinct >= threshold);
            prop_assert_eq!(unlocked_events, expected);
            prop_assert_eq!(unlock_messages, expected);
            prop_assert!(unique <= distinct);
        }
    }
}
