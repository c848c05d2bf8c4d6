//! Liveness classification from heartbeat age.

use serde::Serialize;
use shared_types::LivenessClass;
use std::time::Duration;

/// Thresholds for liveness classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Expected heartbeat period; older than this is `stale`.
    pub interval: Duration,
    /// Multiples of `interval` after which a node is `offline`.
    pub offline_factor: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            offline_factor: 5,
        }
    }
}

impl LivenessConfig {
    /// Age at which a node becomes `offline`.
    #[must_use]
    pub fn offline_after(&self) -> Duration {
        self.interval.saturating_mul(self.offline_factor)
    }

    /// Classify a heartbeat age. `None` means never heard from.
    #[must_use]
    pub fn classify(&self, age: Option<Duration>) -> LivenessClass {
        match age {
            Some(age) if age < self.interval => LivenessClass::Online,
            Some(age) if age < self.offline_after() => LivenessClass::Stale,
            _ => LivenessClass::Offline,
        }
    }
}

/// Number of nodes per liveness class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LivenessCounts {
    pub online: usize,
    pub stale: usize,
    pub offline: usize,
}

impl LivenessCounts {
    pub fn add(&mut self, class: LivenessClass) {
        match class {
            LivenessClass::Online => self.online += 1,
            LivenessClass::Stale => self.stale += 1,
            LivenessClass::Offline => self.offline += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.online + self.stale + self.offline
    }
}
