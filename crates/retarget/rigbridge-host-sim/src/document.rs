//! JSON scene and clip documents.
//!
//! Scenes save the node hierarchy with rest poses and keys, live constraints, connection
//! markers and the playback range. Clips carry per-node keys only.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use rigbridge_core::transform::{
    compose, decompose, quat_from_xyzw, quat_to_xyzw, vec3_from_array, vec3_to_array,
};
use rigbridge_core::{
    BakeRange, ConnectionMarker, ConstraintHost, ConstraintMode, ConstraintSpec, ExportFormat,
    HostError, KeyInterpolation,
};

use crate::curve::{TransformCurve, TransformKey};
use crate::scene::{ChannelLocks, SimScene};

fn identity_xyzw() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDoc {
    pub frame: i64,
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default = "identity_xyzw")]
    pub rotation: [f64; 4],
    #[serde(default)]
    pub interpolation: KeyInterpolation,
}

impl From<&TransformKey> for KeyDoc {
    fn from(key: &TransformKey) -> Self {
        Self {
            frame: key.frame,
            translation: vec3_to_array(&key.translation),
            rotation: quat_to_xyzw(&key.rotation),
            interpolation: key.interpolation,
        }
    }
}

impl From<&KeyDoc> for TransformKey {
    fn from(doc: &KeyDoc) -> Self {
        Self {
            frame: doc.frame,
            translation: vec3_from_array(doc.translation),
            rotation: quat_from_xyzw(doc.rotation),
            interpolation: doc.interpolation,
        }
    }
}

fn curve_from_keys(keys: &[KeyDoc]) -> TransformCurve {
    let mut curve = TransformCurve::new();
    for key in keys {
        curve.insert(key.into());
    }
    curve
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDoc {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default = "identity_xyzw")]
    pub rotation: [f64; 4],
    #[serde(default = "yes")]
    pub keyable: bool,
    #[serde(default)]
    pub locks: ChannelLocks,
    #[serde(default)]
    pub keys: Vec<KeyDoc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDoc {
    pub driver: String,
    pub driven: String,
    pub mode: ConstraintMode,
    pub offset_translation: [f64; 3],
    #[serde(default = "identity_xyzw")]
    pub offset_rotation: [f64; 4],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub playback: BakeRange,
    #[serde(default)]
    pub frame: Option<i64>,
    /// Parents must come before their children.
    pub nodes: Vec<NodeDoc>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDoc>,
    #[serde(default)]
    pub markers: Vec<ConnectionMarker>,
}

impl SceneDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse scene document")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize scene document")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackDoc {
    pub node: String,
    pub keys: Vec<KeyDoc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipDocument {
    #[serde(default)]
    pub name: Option<String>,
    /// Becomes the scene's playback range on import.
    #[serde(default)]
    pub range: Option<BakeRange>,
    pub tracks: Vec<TrackDoc>,
}

impl ClipDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse clip document")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize clip document")
    }
}

/// What `export_scene` writes: the exported subset plus the requested format tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub format: ExportFormat,
    pub scene: SceneDocument,
}

impl ExportDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse export document")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize export document")
    }
}

impl SimScene {
    /// Build a scene from a document. Constraints are recreated with fresh handles.
    pub fn from_document(doc: &SceneDocument) -> Result<Self, HostError> {
        let mut scene = SimScene::new();
        scene.playback = doc.playback;
        scene.frame = doc.frame.unwrap_or(doc.playback.start);
        for node in &doc.nodes {
            let rest = compose(vec3_from_array(node.translation), quat_from_xyzw(node.rotation));
            let handle = scene.add_node(&node.name, node.parent.as_deref(), rest)?;
            let sim = scene.node_mut(handle)?;
            sim.keyable = node.keyable;
            sim.locks = node.locks;
            sim.curve = curve_from_keys(&node.keys);
        }
        scene.evaluate();
        for c in &doc.constraints {
            let driver = scene.handle_of(&c.driver)?;
            let driven = scene.handle_of(&c.driven)?;
            scene.create_constraint(
                driver,
                driven,
                &ConstraintSpec {
                    mode: c.mode,
                    offset_translation: vec3_from_array(c.offset_translation),
                    offset_rotation: quat_from_xyzw(c.offset_rotation),
                },
            )?;
        }
        scene.markers = doc.markers.clone();
        info!(
            "loaded scene {}: {} nodes, {} constraints, {} markers",
            doc.name.as_deref().unwrap_or("<unnamed>"),
            doc.nodes.len(),
            doc.constraints.len(),
            doc.markers.len()
        );
        Ok(scene)
    }

    /// Replace this scene with `doc`, keeping the file table.
    pub fn load_document(&mut self, doc: &SceneDocument) -> Result<(), HostError> {
        let mut loaded = Self::from_document(doc)?;
        loaded.files = std::mem::take(&mut self.files);
        *self = loaded;
        Ok(())
    }

    pub fn to_document(&self) -> SceneDocument {
        self.document_for(|_| true)
    }

    /// Document for `selection` (every node when empty). Nodes whose parent is not selected
    /// become roots with their local channels unchanged; constraints and markers are kept
    /// only when both endpoints are selected.
    pub fn export_document(&self, selection: &[String]) -> Result<SceneDocument, HostError> {
        for name in selection {
            self.handle_of(name)?;
        }
        Ok(self.document_for(|name| {
            selection.is_empty() || selection.iter().any(|s| s == name)
        }))
    }

    fn document_for(&self, selected: impl Fn(&str) -> bool) -> SceneDocument {
        let nodes = self
            .nodes
            .iter()
            .filter(|n| n.alive && selected(&n.name))
            .map(|n| {
                let (t, r) = decompose(&n.rest);
                let parent = n
                    .parent
                    .and_then(|p| self.nodes.get(p.0 as usize))
                    .filter(|p| p.alive && selected(&p.name))
                    .map(|p| p.name.clone());
                NodeDoc {
                    name: n.name.clone(),
                    parent,
                    translation: vec3_to_array(&t),
                    rotation: quat_to_xyzw(&r),
                    keyable: n.keyable,
                    locks: n.locks,
                    keys: n.curve.keys().iter().map(KeyDoc::from).collect(),
                }
            })
            .collect();

        let mut constraints = Vec::new();
        for c in self.constraints.values() {
            let (Ok(driver), Ok(driven)) = (self.node(c.driver), self.node(c.driven)) else {
                continue;
            };
            if selected(&driver.name) && selected(&driven.name) {
                constraints.push(ConstraintDoc {
                    driver: driver.name.clone(),
                    driven: driven.name.clone(),
                    mode: c.spec.mode,
                    offset_translation: vec3_to_array(&c.spec.offset_translation),
                    offset_rotation: quat_to_xyzw(&c.spec.offset_rotation),
                });
            }
        }

        let markers = self
            .markers
            .iter()
            .filter(|m| selected(&m.driver) && selected(&m.driven))
            .cloned()
            .collect();

        SceneDocument {
            name: None,
            playback: self.playback,
            frame: Some(self.frame),
            nodes,
            constraints,
            markers,
        }
    }
}
