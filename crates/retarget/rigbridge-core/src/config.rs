//! Core configuration for rigbridge-core.

use serde::{Deserialize, Serialize};

use crate::bake::BakeConfig;
use crate::connection::CreateOptions;
use crate::error::Result;

/// Configuration for the [`Retargeter`](crate::retargeter::Retargeter) facade.
/// Missing fields take their defaults; unknown fields are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    /// Defaults for `connect` / `connect_ik`.
    pub create: CreateOptions,
    pub bake: BakeConfig,
    pub discover: DiscoverConfig,
    /// Pose tolerance (units and radians) used to check that binding did not move a controller.
    pub epsilon: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverConfig {
    /// Drop registry entries whose marker is no longer in the scene.
    pub prune_missing: bool,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            prune_missing: true,
        }
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            create: CreateOptions::default(),
            bake: BakeConfig::default(),
            discover: DiscoverConfig::default(),
            epsilon: 1e-6,
        }
    }
}

impl RetargetConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::KeyInterpolation;
    use crate::connection::ChannelMask;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = RetargetConfig::from_json(
            r#"{
                "create": { "align_to_position": true },
                "bake": { "interpolation": "host_default" },
                "extra": 1
            }"#,
        )
        .unwrap();
        assert!(cfg.create.align_to_position);
        assert_eq!(cfg.create.channels, ChannelMask::ALL);
        assert_eq!(cfg.bake.interpolation, KeyInterpolation::HostDefault);
        assert!(cfg.bake.remove_markers);
        assert!(cfg.discover.prune_missing);
        assert_eq!(cfg.epsilon, 1e-6);
    }

    #[test]
    fn round_trips_through_json() {
        let mut cfg = RetargetConfig::default();
        cfg.create.channels = ChannelMask::ROTATION;
        cfg.discover.prune_missing = false;
        let back = RetargetConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back.create.channels, ChannelMask::ROTATION);
        assert!(!back.discover.prune_missing);
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = RetargetConfig::from_json("{ nope").unwrap_err();
        assert_eq!(err.category(), "serialization");
    }
}
