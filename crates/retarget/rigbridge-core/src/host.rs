//! Host collaborator traits.
//!
//! The core never owns the scene. Adapters implement these traits over the host
//! application's node, constraint, time and keyframe systems and pass themselves into the
//! registry, binder and bake engine.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::bake::{BakeRange, KeyInterpolation, KeyframeSample};
use crate::error::HostError;
use crate::ids::{ConstraintHandle, NodeHandle};
use crate::marker::ConnectionMarker;
use crate::transform::Pose;

/// Resolves node identifiers (scene names/paths) into handles.
pub trait NodeResolver {
    fn resolve(&self, id: &str) -> Option<NodeHandle>;
}

pub trait TransformQuery {
    fn world_transform(&self, node: NodeHandle) -> Result<Pose, HostError>;

    /// Transform relative to the node's parent.
    fn local_transform(&self, node: NodeHandle) -> Result<Pose, HostError>;

    /// Move a node so its world translation matches `translation`, keeping its rotation.
    fn set_world_translation(
        &mut self,
        node: NodeHandle,
        translation: &Vector3<f64>,
    ) -> Result<(), HostError>;
}

/// Which channels a single host constraint drives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// Full rigid follow: `driven = driver * offset`.
    Parent,
    /// Translation only: `driven.t = driver.t + offset.t` (world-space delta).
    Point,
    /// Rotation only: `driven.r = driver.r * offset.r`.
    Orient,
}

/// Request for one live constraint, with the offset frozen at bind time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstraintSpec {
    pub mode: ConstraintMode,
    pub offset_translation: Vector3<f64>,
    pub offset_rotation: UnitQuaternion<f64>,
}

pub trait ConstraintHost {
    /// Create a live constraint. It must take effect immediately.
    fn create_constraint(
        &mut self,
        driver: NodeHandle,
        driven: NodeHandle,
        spec: &ConstraintSpec,
    ) -> Result<ConstraintHandle, HostError>;

    /// Destroy a live constraint. Unknown handles report [`HostError::StaleHandle`].
    fn destroy_constraint(&mut self, handle: ConstraintHandle) -> Result<(), HostError>;

    /// Live constraints currently linking `driver` to `driven`, used when rediscovering a
    /// connection from a reloaded scene.
    fn constraints_between(&self, driver: NodeHandle, driven: NodeHandle)
        -> Vec<ConstraintHandle>;
}

pub trait TimeControl {
    fn current_frame(&self) -> i64;

    /// Move the time cursor and force evaluation at `frame`.
    fn set_current_frame(&mut self, frame: i64);

    fn playback_range(&self) -> BakeRange;
}

pub trait Keyframer {
    fn set_keyframe(
        &mut self,
        node: NodeHandle,
        sample: &KeyframeSample,
        interpolation: KeyInterpolation,
    ) -> Result<(), HostError>;
}

/// Scene-persisted connection markers.
pub trait MarkerStore {
    fn list_markers(&self) -> Result<Vec<ConnectionMarker>, HostError>;

    /// Insert or replace the marker for the marker's endpoint pair.
    fn write_marker(&mut self, marker: &ConnectionMarker) -> Result<(), HostError>;

    fn remove_marker(&mut self, driver: &str, driven: &str) -> Result<(), HostError>;
}

/// Everything the core needs from a host.
pub trait Host:
    NodeResolver + TransformQuery + ConstraintHost + TimeControl + Keyframer + MarkerStore
{
}

impl<T> Host for T where
    T: NodeResolver
        + TransformQuery
        + ConstraintHost
        + TimeControl
        + Keyframer
        + MarkerStore
        + ?Sized
{
}
