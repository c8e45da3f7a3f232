//! In-memory scene: a node hierarchy with keyframe curves and live constraints.
//!
//! Evaluation runs eagerly after every mutation: each node takes its local pose from its
//! curve (or its rest pose when it has no keys), then constraints are applied in dependency
//! order, each one writing the driven node's local pose. A constraint runs after every
//! constraint that moves its driver or one of its driven node's parents; ties go to the
//! older handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use rigbridge_core::transform::{
    apply_local_offset, apply_rotation_offset, apply_translation_offset, compose, world_to_local,
};
use rigbridge_core::{
    BakeRange, ConnectionMarker, ConstraintHandle, ConstraintMode, ConstraintSpec,
    HandleAllocator, HostError, NodeHandle, Pose,
};

use crate::curve::TransformCurve;

/// Channels a node refuses to have driven or moved.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelLocks {
    pub translation: bool,
    pub rotation: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct SimNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) rest: Pose,
    /// Evaluated local pose at the current frame.
    pub(crate) local: Pose,
    pub(crate) curve: TransformCurve,
    pub(crate) locks: ChannelLocks,
    pub(crate) keyable: bool,
    pub(crate) alive: bool,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct SimConstraint {
    pub(crate) driver: NodeHandle,
    pub(crate) driven: NodeHandle,
    pub(crate) spec: ConstraintSpec,
}

#[derive(Debug)]
pub struct SimScene {
    /// Indexed by `NodeHandle.0`; removed nodes stay as tombstones.
    pub(crate) nodes: Vec<SimNode>,
    pub(crate) names: HashMap<String, NodeHandle>,
    pub(crate) constraints: BTreeMap<ConstraintHandle, SimConstraint>,
    pub(crate) pinned: HashSet<ConstraintHandle>,
    pub(crate) markers: Vec<ConnectionMarker>,
    pub(crate) frame: i64,
    pub(crate) playback: BakeRange,
    pub(crate) ids: HandleAllocator,
    /// Stand-in for the file system used by scene open/import/export.
    pub(crate) files: HashMap<PathBuf, String>,
}

impl Default for SimScene {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            constraints: BTreeMap::new(),
            pinned: HashSet::new(),
            markers: Vec::new(),
            frame: 1,
            playback: BakeRange { start: 1, end: 24 },
            ids: HandleAllocator::new(),
            files: HashMap::new(),
        }
    }
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or at the root) with the given local rest pose.
    pub fn add_node(
        &mut self,
        name: &str,
        parent: Option<&str>,
        rest: Pose,
    ) -> Result<NodeHandle, HostError> {
        if self.names.contains_key(name) {
            return Err(HostError::Rejected(format!("node {name} already exists")));
        }
        let parent = match parent {
            Some(p) => Some(self.handle_of(p)?),
            None => None,
        };
        let handle = self.ids.alloc_node();
        debug_assert_eq!(handle.0 as usize, self.nodes.len());
        self.nodes.push(SimNode {
            name: name.to_string(),
            parent,
            rest,
            local: rest,
            curve: TransformCurve::new(),
            locks: ChannelLocks::default(),
            keyable: true,
            alive: true,
        });
        self.names.insert(name.to_string(), handle);
        self.evaluate();
        Ok(handle)
    }

    /// Delete a node and every constraint that references it. Children keep their handles
    /// but lose their parent.
    pub fn remove_node(&mut self, name: &str) -> Result<(), HostError> {
        let handle = self.handle_of(name)?;
        self.names.remove(name);
        self.constraints
            .retain(|_, c| c.driver != handle && c.driven != handle);
        for node in &mut self.nodes {
            if node.parent == Some(handle) {
                node.parent = None;
            }
        }
        if let Some(node) = self.nodes.get_mut(handle.0 as usize) {
            node.alive = false;
        }
        self.evaluate();
        Ok(())
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .iter()
            .filter(|n| n.alive)
            .map(|n| n.name.as_str())
    }

    pub fn lock(&mut self, name: &str, locks: ChannelLocks) -> Result<(), HostError> {
        let handle = self.handle_of(name)?;
        self.node_mut(handle)?.locks = locks;
        Ok(())
    }

    pub fn set_keyable(&mut self, name: &str, keyable: bool) -> Result<(), HostError> {
        let handle = self.handle_of(name)?;
        self.node_mut(handle)?.keyable = keyable;
        Ok(())
    }

    pub fn set_playback_range(&mut self, range: BakeRange) {
        self.playback = range;
    }

    pub fn curve(&self, name: &str) -> Option<&TransformCurve> {
        let handle = self.names.get(name)?;
        self.nodes.get(handle.0 as usize).map(|n| &n.curve)
    }

    /// Replace a node's animation.
    pub fn set_curve(&mut self, name: &str, curve: TransformCurve) -> Result<(), HostError> {
        let handle = self.handle_of(name)?;
        self.node_mut(handle)?.curve = curve;
        self.evaluate();
        Ok(())
    }

    /// World pose of a node by name at the current frame.
    pub fn world(&self, name: &str) -> Result<Pose, HostError> {
        self.world_of(self.handle_of(name)?)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraint_spec(&self, handle: ConstraintHandle) -> Option<&ConstraintSpec> {
        self.constraints.get(&handle).map(|c| &c.spec)
    }

    /// Drop a constraint behind the caller's back, as a user deleting it by hand would.
    pub fn forget_constraint(&mut self, handle: ConstraintHandle) -> bool {
        let removed = self.constraints.remove(&handle).is_some();
        self.evaluate();
        removed
    }

    /// Make `destroy_constraint` refuse this handle.
    pub fn pin_constraint(&mut self, handle: ConstraintHandle) {
        self.pinned.insert(handle);
    }

    pub fn unpin_constraint(&mut self, handle: ConstraintHandle) {
        self.pinned.remove(&handle);
    }

    pub fn put_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn file(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn file_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.files.keys().map(PathBuf::as_path).collect();
        paths.sort();
        paths
    }

    pub(crate) fn handle_of(&self, name: &str) -> Result<NodeHandle, HostError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| HostError::NodeNotFound(name.to_string()))
    }

    pub(crate) fn node(&self, handle: NodeHandle) -> Result<&SimNode, HostError> {
        match self.nodes.get(handle.0 as usize) {
            Some(node) if node.alive => Ok(node),
            _ => Err(HostError::NodeNotFound(format!("{handle:?}"))),
        }
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut SimNode, HostError> {
        match self.nodes.get_mut(handle.0 as usize) {
            Some(node) if node.alive => Ok(node),
            _ => Err(HostError::NodeNotFound(format!("{handle:?}"))),
        }
    }

    pub(crate) fn world_of(&self, handle: NodeHandle) -> Result<Pose, HostError> {
        let node = self.node(handle)?;
        let mut pose = node.local;
        let mut parent = node.parent;
        while let Some(p) = parent {
            let up = self.node(p)?;
            pose = up.local * pose;
            parent = up.parent;
        }
        Ok(pose)
    }

    pub(crate) fn parent_world(&self, handle: NodeHandle) -> Result<Pose, HostError> {
        match self.node(handle)?.parent {
            Some(parent) => self.world_of(parent),
            None => Ok(Pose::identity()),
        }
    }

    /// True when `ancestor` is `node` or one of its parents.
    pub(crate) fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut cursor = Some(node);
        while let Some(h) = cursor {
            if h == ancestor {
                return true;
            }
            cursor = self.nodes.get(h.0 as usize).and_then(|n| n.parent);
        }
        false
    }

    pub(crate) fn evaluate(&mut self) {
        let frame = self.frame;
        for node in self.nodes.iter_mut().filter(|n| n.alive) {
            node.local = node.curve.sample(frame).unwrap_or(node.rest);
        }
        for (handle, constraint) in self.constraint_order() {
            if let Err(err) = self.apply_constraint(&constraint) {
                warn!("{handle} not applied at frame {frame}: {err}");
            }
        }
    }

    /// True when `upstream` moves something `downstream` reads: its driver, or a parent
    /// of its driven node.
    fn feeds(&self, upstream: &SimConstraint, downstream: &SimConstraint) -> bool {
        upstream.driven != downstream.driven
            && (self.is_ancestor(upstream.driven, downstream.driver)
                || self.is_ancestor(upstream.driven, downstream.driven))
    }

    fn constraint_order(&self) -> Vec<(ConstraintHandle, SimConstraint)> {
        let mut pending: Vec<(ConstraintHandle, SimConstraint)> =
            self.constraints.iter().map(|(h, c)| (*h, *c)).collect();
        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|(handle, c)| {
                !pending
                    .iter()
                    .any(|(other, up)| other != handle && self.feeds(up, c))
            });
            let next = match ready {
                Some(index) => index,
                None => {
                    warn!("constraint loop through {}, applying in handle order", pending[0].0);
                    0
                }
            };
            order.push(pending.remove(next));
        }
        order
    }

    fn apply_constraint(&mut self, c: &SimConstraint) -> Result<(), HostError> {
        let driver = self.world_of(c.driver)?;
        let driven = self.world_of(c.driven)?;
        let spec = &c.spec;
        let target = match spec.mode {
            ConstraintMode::Parent => {
                apply_local_offset(&driver, &spec.offset_translation, &spec.offset_rotation)
            }
            ConstraintMode::Point => compose(
                apply_translation_offset(&driver, &spec.offset_translation),
                driven.rotation,
            ),
            ConstraintMode::Orient => compose(
                driven.translation.vector,
                apply_rotation_offset(&driver, &spec.offset_rotation),
            ),
        };
        let local = world_to_local(&self.parent_world(c.driven)?, &target);
        self.node_mut(c.driven)?.local = local;
        Ok(())
    }

    pub(crate) fn insert_constraint(&mut self, constraint: SimConstraint) -> ConstraintHandle {
        let handle = self.ids.alloc_constraint();
        let ends = (self.node(constraint.driver), self.node(constraint.driven));
        if let (Ok(driver), Ok(driven)) = ends {
            debug!("{handle}: {:?} {} -> {}", constraint.spec.mode, driver.name, driven.name);
        }
        self.constraints.insert(handle, constraint);
        self.evaluate();
        handle
    }
}
