//! Node configuration payload schema.
//!
//! Everything the dashboard can change on a node, validated at the boundary
//! before it reaches the dispatcher. Unmodeled keys travel in a bounded
//! extension map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::ValidationError;

use super::accessibility::AccessibilitySettings;

/// Maximum number of extension keys per payload.
pub const MAX_EXTENSIONS: usize = 16;

const SECTIONS: [&str; 3] = ["audio", "proximity", "accessibility"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl AudioSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(ValidationError::invalid_field(
                    "audio.volume",
                    format!("{volume} is outside 0..=1"),
                ));
            }
        }
        if let Some(file) = &self.fragment_file {
            if file.is_empty() || file.contains("..") {
                return Err(ValidationError::invalid_field(
                    "audio.fragment_file",
                    "must be a non-empty relative asset name",
                ));
            }
        }
        Ok(())
    }
}

/// Distance thresholds in millimetres.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_mm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_threshold_mm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hysteresis_mm: Option<u32>,
}

impl ProximitySettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(min), Some(max)) = (self.min_mm, self.max_mm) {
            if min >= max {
                return Err(ValidationError::invalid_field(
                    "proximity",
                    format!("min_mm {min} must be below max_mm {max}"),
                ));
            }
            if let Some(story) = self.story_threshold_mm {
                if story < min || story > max {
                    return Err(ValidationError::invalid_field(
                        "proximity.story_threshold_mm",
                        format!("{story} is outside {min}..={max}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Configuration pushed to one node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfigPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity: Option<ProximitySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilitySettings>,
    /// Fields not modeled above, passed through as-is.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl NodeConfigPayload {
    /// Payload that only carries accessibility settings.
    #[must_use]
    pub fn accessibility(settings: AccessibilitySettings) -> Self {
        Self {
            accessibility: Some(settings),
            ..Self::default()
        }
    }

    /// Parse dashboard JSON and validate it.
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        let payload: Self = serde_json::from_value(value)
            .map_err(|e| ValidationError::invalid_field("payload", e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_none()
            && self.proximity.is_none()
            && self.accessibility.is_none()
            && self.extensions.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::invalid_field(
                "payload",
                "nothing to apply",
            ));
        }
        if self.extensions.len() > MAX_EXTENSIONS {
            return Err(ValidationError::invalid_field(
                "extensions",
                format!("{} keys exceed the limit of {MAX_EXTENSIONS}", self.extensions.len()),
            ));
        }
        if let Some(key) = self.extensions.keys().find(|k| SECTIONS.contains(&k.as_str())) {
            return Err(ValidationError::invalid_field(
                format!("extensions.{key}"),
                "shadows a modeled section",
            ));
        }
        if let Some(audio) = &self.audio {
            audio.validate()?;
        }
        if let Some(proximity) = &self.proximity {
            proximity.validate()?;
        }
        if let Some(accessibility) = &self.accessibility {
            accessibility.validate()?;
        }
        Ok(())
    }

    /// Wire form for the config push.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
