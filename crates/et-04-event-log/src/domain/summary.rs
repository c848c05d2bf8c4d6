//! Derived reporting over a run of event records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{EventKind, EventRecord};

/// How many records `recent_events` carries.
pub const RECENT_EVENTS: usize = 10;

/// Interpretation-ready metrics for the dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventSummary {
    /// Trigger count per node. Records without a node count under "".
    pub by_node: BTreeMap<String, usize>,
    pub heartbeat_by_node: BTreeMap<String, usize>,
    pub narrative_unlocks: usize,
    pub total_triggers: usize,
    /// Unlocks per trigger attempt, capped at 1.0.
    pub completion_rate: f64,
    /// Mean gap between consecutive triggers, by timestamp.
    pub mean_trigger_interval_seconds: f64,
    pub recent_events: Vec<EventRecord>,
}

impl EventSummary {
    /// Summarize `records`, given in append order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut summary = Self::default();
        let mut trigger_times: Vec<DateTime<Utc>> = Vec::new();
        let mut recent: Vec<&EventRecord> = Vec::new();

        for record in records {
            let node = record
                .node_id
                .as_ref()
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            match record.kind {
                EventKind::FragmentTriggered => {
                    *summary.by_node.entry(node).or_default() += 1;
                    trigger_times.push(record.timestamp);
                }
                EventKind::HeartbeatReceived => {
                    *summary.heartbeat_by_node.entry(node).or_default() += 1;
                }
                EventKind::NarrativeUnlocked => summary.narrative_unlocks += 1,
                _ => {}
            }
            recent.push(record);
        }

        summary.total_triggers = summary.by_node.values().sum();
        if summary.total_triggers > 0 {
            summary.completion_rate =
                (summary.narrative_unlocks as f64 / summary.total_triggers as f64).min(1.0);
        }

        if trigger_times.len() >= 2 {
            trigger_times.sort();
            let gaps: Vec<f64> = trigger_times
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
                .collect();
            summary.mean_trigger_interval_seconds = gaps.iter().sum::<f64>() / gaps.len() as f64;
        }

        let skip = recent.len().saturating_sub(RECENT_EVENTS);
        summary.recent_events = recent.into_iter().skip(skip).cloned().collect();
        summary
    }
}
