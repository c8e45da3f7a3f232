//! Persisted connection markers.
//!
//! A marker is what the host saves with the scene for every connection. Vectors are stored
//! as `[f64; 3]`, quaternions as `[f64; 4]` in (x, y, z, w) order.

use serde::{Deserialize, Serialize};

use crate::connection::{ChannelMask, ConnectionKind, ConnectionOffset, MarkerColor};
use crate::error::Result;
use crate::ids::ConnectionKey;
use crate::transform::{quat_from_xyzw, quat_to_xyzw, vec3_from_array, vec3_to_array};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMarker {
    /// Display name, `<driver><suffix>`.
    pub name: String,
    pub driver: String,
    pub driven: String,
    pub kind: ConnectionKind,
    #[serde(default)]
    pub channels: ChannelMask,
    pub offset_translation: [f64; 3],
    pub offset_rotation: [f64; 4],
    #[serde(default)]
    pub color: MarkerColor,
}

impl ConnectionMarker {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.driver.clone(), self.driven.clone())
    }

    pub fn offset(&self) -> ConnectionOffset {
        ConnectionOffset {
            translation: vec3_from_array(self.offset_translation),
            rotation: quat_from_xyzw(self.offset_rotation),
        }
    }

    pub(crate) fn encode_offset(offset: &ConnectionOffset) -> ([f64; 3], [f64; 4]) {
        (
            vec3_to_array(&offset.translation),
            quat_to_xyzw(&offset.rotation),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Serialize a marker list, e.g. for a host that stores all markers in one attribute.
pub fn markers_to_json(markers: &[ConnectionMarker]) -> Result<String> {
    Ok(serde_json::to_string_pretty(markers)?)
}

pub fn markers_from_json(text: &str) -> Result<Vec<ConnectionMarker>> {
    Ok(serde_json::from_str(text)?)
}
