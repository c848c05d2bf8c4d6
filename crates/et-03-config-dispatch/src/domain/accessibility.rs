//! Accessibility settings and profiles.
//!
//! A profile is a global settings layer, named presets that can be merged
//! into it, and per-node overrides laid on top. Unset fields inherit.
//!
//! [`ProfileBaselines`] tracks, per node, which effective settings the node
//! acknowledged and which are still in flight, so re-applying a profile
//! reaches nodes that joined later or never acknowledged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::{CorrelationId, NodeId, ValidationError};

use crate::domain::request::PushStatus;

/// Accessibility toggles understood by nodes. `None` means "inherit".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilitySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_pulse: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity_glow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobility_buffer_ms: Option<u32>,
    /// Extra plays of a fragment, 0..=2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u8>,
    /// Playback speed factor, 0.85..=1.15.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_limiter: Option<bool>,
}

impl AccessibilitySettings {
    pub const REPEAT_MAX: u8 = 2;
    pub const PACE_MIN: f64 = 0.85;
    pub const PACE_MAX: f64 = 1.15;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(repeat) = self.repeat {
            if repeat > Self::REPEAT_MAX {
                return Err(ValidationError::invalid_field(
                    "accessibility.repeat",
                    format!("{repeat} exceeds {}", Self::REPEAT_MAX),
                ));
            }
        }
        if let Some(pace) = self.pace {
            if !(Self::PACE_MIN..=Self::PACE_MAX).contains(&pace) {
                return Err(ValidationError::invalid_field(
                    "accessibility.pace",
                    format!("{pace} is outside {}..={}", Self::PACE_MIN, Self::PACE_MAX),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay every field `other` sets onto `self`.
    pub fn merge(&mut self, other: &Self) {
        fn take<T: Clone>(into: &mut Option<T>, from: &Option<T>) {
            if from.is_some() {
                into.clone_from(from);
            }
        }
        take(&mut self.captions, &other.captions);
        take(&mut self.visual_pulse, &other.visual_pulse);
        take(&mut self.proximity_glow, &other.proximity_glow);
        take(&mut self.mobility_buffer_ms, &other.mobility_buffer_ms);
        take(&mut self.repeat, &other.repeat);
        take(&mut self.pace, &other.pace);
        take(&mut self.safety_limiter, &other.safety_limiter);
    }

    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }
}

/// Global settings, presets and per-node overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityProfile {
    #[serde(default)]
    pub global: AccessibilitySettings,
    #[serde(default)]
    pub presets: BTreeMap<String, AccessibilitySettings>,
    #[serde(default)]
    pub per_node_overrides: BTreeMap<NodeId, AccessibilitySettings>,
}

impl AccessibilityProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.global.validate()?;
        for settings in self.presets.values().chain(self.per_node_overrides.values()) {
            settings.validate()?;
        }
        Ok(())
    }

    /// Merge a named preset into the global layer.
    pub fn apply_preset(&mut self, name: &str) -> Result<(), ValidationError> {
        let preset = self.presets.get(name).cloned().ok_or_else(|| {
            ValidationError::invalid_field("preset", format!("unknown preset {name:?}"))
        })?;
        self.global.merge(&preset);
        Ok(())
    }

    /// Merge `settings` into the override for `node_id`.
    pub fn set_override(&mut self, node_id: NodeId, settings: &AccessibilitySettings) {
        self.per_node_overrides
            .entry(node_id)
            .or_default()
            .merge(settings);
    }

    /// What `node_id` should run with.
    #[must_use]
    pub fn effective_for(&self, node_id: &NodeId) -> AccessibilitySettings {
        match self.per_node_overrides.get(node_id) {
            Some(over) => self.global.merged(over),
            None => self.global.clone(),
        }
    }

    /// Nodes among `nodes` whose effective settings differ between
    /// `previous` and `next`. With no previous profile every node differs.
    #[must_use]
    pub fn diff(previous: Option<&Self>, next: &Self, nodes: &[NodeId]) -> Vec<NodeId> {
        nodes
            .iter()
            .filter(|node| match previous {
                None => true,
                Some(prev) => prev.effective_for(node) != next.effective_for(node),
            })
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
struct NodeBaseline {
    acked: Option<AccessibilitySettings>,
    in_flight: Option<(CorrelationId, AccessibilitySettings)>,
}

/// Per-node record of delivered accessibility settings.
#[derive(Clone, Debug, Default)]
pub struct ProfileBaselines {
    nodes: BTreeMap<NodeId, NodeBaseline>,
}

impl ProfileBaselines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold resolved pushes into the baselines. `status_of` reports the
    /// current status of a correlation id, `None` once it is forgotten.
    /// An acked push becomes the node's baseline; any other terminal or
    /// unknown outcome leaves the previous baseline in place.
    pub fn settle(&mut self, status_of: impl Fn(&CorrelationId) -> Option<PushStatus>) {
        for baseline in self.nodes.values_mut() {
            let Some(correlation_id) = baseline.in_flight.as_ref().map(|(id, _)| *id) else {
                continue;
            };
            match status_of(&correlation_id) {
                Some(PushStatus::Pending) => {}
                Some(PushStatus::Acked) => {
                    baseline.acked = baseline.in_flight.take().map(|(_, settings)| settings);
                }
                Some(PushStatus::TimedOut | PushStatus::Superseded) | None => {
                    baseline.in_flight = None;
                }
            }
        }
    }

    /// Whether `node_id` has to be sent `effective`. A node with nothing
    /// acked and nothing in flight always does.
    #[must_use]
    pub fn needs_push(&self, node_id: &NodeId, effective: &AccessibilitySettings) -> bool {
        match self.nodes.get(node_id) {
            None => true,
            Some(NodeBaseline {
                in_flight: Some((_, settings)),
                ..
            }) => settings != effective,
            Some(baseline) => baseline.acked.as_ref() != Some(effective),
        }
    }

    /// Remember a published push awaiting its ack.
    pub fn record_push(
        &mut self,
        node_id: NodeId,
        correlation_id: CorrelationId,
        settings: AccessibilitySettings,
    ) {
        self.nodes.entry(node_id).or_default().in_flight = Some((correlation_id, settings));
    }

    /// Drop nodes no longer in the roster.
    pub fn retain(&mut self, roster: &[NodeId]) {
        self.nodes.retain(|node_id, _| roster.contains(node_id));
    }

    /// Settings `node_id` acknowledged last.
    #[must_use]
    pub fn acked(&self, node_id: &NodeId) -> Option<&AccessibilitySettings> {
        self.nodes.get(node_id).and_then(|b| b.acked.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::parse(id).unwrap()
    }

    fn profile() -> AccessibilityProfile {
        let mut profile = AccessibilityProfile::default();
        profile.global.captions = Some(false);
        profile.presets.insert(
            "low_vision".into(),
            AccessibilitySettings {
                captions: Some(true),
                visual_pulse: Some(true),
                ..Default::default()
            },
        );
        profile
    }

    #[test]
    fn test_apply_preset_merges_into_global() {
        let mut p = profile();
        p.global.pace = Some(1.0);
        p.apply_preset("low_vision").unwrap();
        assert_eq!(p.global.captions, Some(true));
        assert_eq!(p.global.visual_pulse, Some(true));
        assert_eq!(p.global.pace, Some(1.0));
        assert!(p.apply_preset("missing").is_err());
    }

    #[test]
    fn test_effective_overlays_override() {
        let mut p = profile();
        p.set_override(
            node("whisper-2"),
            &AccessibilitySettings {
                repeat: Some(2),
                captions: Some(true),
                ..Default::default()
            },
        );
        let eff = p.effective_for(&node("whisper-2"));
        assert_eq!(eff.captions, Some(true));
        assert_eq!(eff.repeat, Some(2));
        assert_eq!(p.effective_for(&node("whisper-1")).captions, Some(false));
    }

    #[test]
    fn test_diff() {
        let nodes = vec![node("whisper-1"), node("whisper-2"), node("mystery")];
        let before = profile();
        assert_eq!(AccessibilityProfile::diff(None, &before, &nodes).len(), 3);
        assert!(AccessibilityProfile::diff(Some(&before), &before, &nodes).is_empty());

        let mut after = before.clone();
        after.set_override(
            node("mystery"),
            &AccessibilitySettings {
                safety_limiter: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(
            AccessibilityProfile::diff(Some(&before), &after, &nodes),
            vec![node("mystery")]
        );
    }

    #[test]
    fn test_validation() {
        let mut p = profile();
        p.global.pace = Some(2.0);
        assert!(p.validate().is_err());

        let mut p = profile();
        p.set_override(
            node("whisper-1"),
            &AccessibilitySettings {
                repeat: Some(3),
                ..Default::default()
            },
        );
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_profile_deserializes_with_missing_layers() {
        let p: AccessibilityProfile =
            serde_json::from_str(r#"{"global": {"captions": true}}"#).unwrap();
        assert_eq!(p.global.captions, Some(true));
        assert!(p.presets.is_empty());
        assert!(p.per_node_overrides.is_empty());
    }

    fn captions(on: bool) -> AccessibilitySettings {
        AccessibilitySettings {
            captions: Some(on),
            ..Default::default()
        }
    }

    #[test]
    fn test_baseline_follows_acks_only() {
        let w1 = node("whisper-1");
        let mut baselines = ProfileBaselines::new();
        assert!(baselines.needs_push(&w1, &captions(true)));

        let first = CorrelationId::new();
        baselines.record_push(w1.clone(), first, captions(true));
        baselines.settle(|_| Some(PushStatus::Pending));
        assert!(!baselines.needs_push(&w1, &captions(true)));
        assert!(baselines.needs_push(&w1, &captions(false)));

        // Timed out: nothing was delivered, so the same settings go again.
        baselines.settle(|_| Some(PushStatus::TimedOut));
        assert!(baselines.needs_push(&w1, &captions(true)));
        assert!(baselines.acked(&w1).is_none());

        let second = CorrelationId::new();
        baselines.record_push(w1.clone(), second, captions(true));
        baselines.settle(|id| (*id == second).then_some(PushStatus::Acked));
        assert_eq!(baselines.acked(&w1), Some(&captions(true)));
        assert!(!baselines.needs_push(&w1, &captions(true)));

        // A change in flight is judged against what is in flight.
        baselines.record_push(w1.clone(), CorrelationId::new(), captions(false));
        assert!(baselines.needs_push(&w1, &captions(true)));
        baselines.settle(|_| None);
        assert!(!baselines.needs_push(&w1, &captions(true)));
    }

    #[test]
    fn test_baselines_drop_retired_nodes() {
        let mut baselines = ProfileBaselines::new();
        for id in ["whisper-1", "whisper-2"] {
            baselines.record_push(node(id), CorrelationId::new(), captions(true));
        }
        baselines.settle(|_| Some(PushStatus::Acked));
        baselines.retain(&[node("whisper-2")]);
        assert!(baselines.needs_push(&node("whisper-1"), &captions(true)));
        assert!(!baselines.needs_push(&node("whisper-2"), &captions(true)));
    }
}
