//! Connection model: one driver → driven retargeting link.

use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::binder::{ConstraintBinder, ReleaseReport};
use crate::error::{RetargetError, Result};
use crate::host::{ConstraintHost, ConstraintMode, ConstraintSpec, NodeResolver, TransformQuery};
use crate::ids::{ConnectionKey, ConstraintHandle};
use crate::marker::ConnectionMarker;
use crate::registry::ConnectionRegistry;
use crate::transform::{compute_local_offset, compute_split_offset};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// One constraint driving the selected channels together.
    #[default]
    Direct,
    /// Separate translation and rotation constraints, each with its own offset (IK controls).
    Decomposed,
}

/// Channels a direct connection drives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChannelMask {
    pub translation: bool,
    pub rotation: bool,
}

impl ChannelMask {
    pub const ALL: Self = Self {
        translation: true,
        rotation: true,
    };
    pub const TRANSLATION: Self = Self {
        translation: true,
        rotation: false,
    };
    pub const ROTATION: Self = Self {
        translation: false,
        rotation: true,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.translation && !self.rotation
    }

    fn marker_suffix(&self) -> &'static str {
        match (self.translation, self.rotation) {
            (true, false) => "_TRAN",
            (false, true) => "_ROT",
            _ => "_TRAN_ROT",
        }
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Display colour of a connection marker in the host viewport.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    #[default]
    Red,
    Cyan,
    Lime,
    Yellow,
}

impl MarkerColor {
    /// red → cyan → lime → yellow → red
    pub fn next(self) -> Self {
        match self {
            Self::Red => Self::Cyan,
            Self::Cyan => Self::Lime,
            Self::Lime => Self::Yellow,
            Self::Yellow => Self::Red,
        }
    }
}

/// Options applied when a connection is created.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Ignored for decomposed connections, which always drive both channels.
    pub channels: ChannelMask,
    /// Snap the driven node's world translation onto the driver before taking the offset.
    pub align_to_position: bool,
}

/// Offset frozen at creation time.
///
/// For a direct connection driving both channels this is a rigid offset in driver space.
/// Otherwise the translation is a world-space delta and the rotation is `driver⁻¹ · driven`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConnectionOffset {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for ConnectionOffset {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

/// One retargeting link. Owns its live constraint handles while bound.
#[derive(Debug)]
pub struct Connection {
    key: ConnectionKey,
    kind: ConnectionKind,
    channels: ChannelMask,
    offset: ConnectionOffset,
    color: MarkerColor,
    handles: Vec<ConstraintHandle>,
}

impl Connection {
    /// Validate endpoints against the host and registry, then capture the offset.
    ///
    /// Nothing is bound here: the returned connection is unbound, and the offset reflects the
    /// driven node's pose before any constraint exists.
    pub fn create<H>(
        host: &mut H,
        registry: &ConnectionRegistry,
        driver: &str,
        driven: &str,
        kind: ConnectionKind,
        options: &CreateOptions,
    ) -> Result<Self>
    where
        H: NodeResolver + TransformQuery + ?Sized,
    {
        let driver_node = host
            .resolve(driver)
            .ok_or_else(|| RetargetError::InvalidEndpoint { id: driver.into() })?;
        let driven_node = host
            .resolve(driven)
            .ok_or_else(|| RetargetError::InvalidEndpoint { id: driven.into() })?;
        if driver_node == driven_node {
            return Err(RetargetError::InvalidEndpoint { id: driven.into() });
        }

        let channels = match kind {
            ConnectionKind::Decomposed => ChannelMask::ALL,
            ConnectionKind::Direct => options.channels,
        };
        if channels.is_empty() {
            return Err(RetargetError::InvalidChannels {
                driver: driver.into(),
                driven: driven.into(),
            });
        }

        let key = ConnectionKey::new(driver, driven);
        if registry.contains(&key) {
            return Err(RetargetError::DuplicateConnection {
                driver: key.driver,
                driven: key.driven,
            });
        }
        if let Some(bound) = registry.bound_driver_of(driven) {
            return Err(RetargetError::DrivenAlreadyBound {
                driven: driven.into(),
                bound_driver: bound.to_string(),
            });
        }

        let driver_world = host.world_transform(driver_node)?;
        if options.align_to_position {
            host.set_world_translation(driven_node, &driver_world.translation.vector)?;
        }
        let driven_world = host.world_transform(driven_node)?;

        let (translation, rotation) = match (kind, channels) {
            (ConnectionKind::Direct, ChannelMask::ALL) => {
                compute_local_offset(&driven_world, &driver_world)
            }
            _ => compute_split_offset(&driven_world, &driver_world),
        };
        debug!(
            "offset for {key}: t={:?} r={:?}",
            translation.as_slice(),
            rotation.euler_angles()
        );

        Ok(Self {
            key,
            kind,
            channels,
            offset: ConnectionOffset {
                translation,
                rotation,
            },
            color: registry.current_color(),
            handles: Vec::new(),
        })
    }

    /// Rebuild a connection from a persisted marker plus the live handles the host reports.
    pub(crate) fn from_marker(marker: &ConnectionMarker, handles: Vec<ConstraintHandle>) -> Self {
        let channels = match marker.kind {
            ConnectionKind::Decomposed => ChannelMask::ALL,
            ConnectionKind::Direct => marker.channels,
        };
        Self {
            key: marker.key(),
            kind: marker.kind,
            channels,
            offset: marker.offset(),
            color: marker.color,
            handles,
        }
    }

    #[cfg(test)]
    pub(crate) fn unbound_for_test(driver: &str, driven: &str, kind: ConnectionKind) -> Self {
        Self {
            key: ConnectionKey::new(driver, driven),
            kind,
            channels: ChannelMask::ALL,
            offset: ConnectionOffset::default(),
            color: MarkerColor::default(),
            handles: Vec::new(),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn driver(&self) -> &str {
        &self.key.driver
    }

    pub fn driven(&self) -> &str {
        &self.key.driven
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn channels(&self) -> ChannelMask {
        self.channels
    }

    pub fn offset(&self) -> &ConnectionOffset {
        &self.offset
    }

    pub fn color(&self) -> MarkerColor {
        self.color
    }

    pub(crate) fn set_color(&mut self, color: MarkerColor) {
        self.color = color;
    }

    /// Live constraint handles, empty when unbound.
    pub fn handles(&self) -> &[ConstraintHandle] {
        &self.handles
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        !self.handles.is_empty()
    }

    pub(crate) fn attach_handles(&mut self, handles: Vec<ConstraintHandle>) {
        self.handles = handles;
    }

    pub(crate) fn take_handles(&mut self) -> Vec<ConstraintHandle> {
        std::mem::take(&mut self.handles)
    }

    /// Marker display name, e.g. `joint_L_elbow_TRAN_ROT`.
    pub fn marker_name(&self) -> String {
        let suffix = match self.kind {
            ConnectionKind::Decomposed => "_TRAN",
            ConnectionKind::Direct => self.channels.marker_suffix(),
        };
        format!("{}{}", self.key.driver, suffix)
    }

    pub fn to_marker(&self) -> ConnectionMarker {
        let (offset_translation, offset_rotation) = ConnectionMarker::encode_offset(&self.offset);
        ConnectionMarker {
            name: self.marker_name(),
            driver: self.key.driver.clone(),
            driven: self.key.driven.clone(),
            kind: self.kind,
            channels: self.channels,
            offset_translation,
            offset_rotation,
            color: self.color,
        }
    }

    /// Host constraints that realize this connection, in creation order.
    pub fn constraint_specs(&self) -> Vec<ConstraintSpec> {
        let t = self.offset.translation;
        let r = self.offset.rotation;
        let spec = |mode| ConstraintSpec {
            mode,
            offset_translation: t,
            offset_rotation: r,
        };
        match (self.kind, self.channels) {
            (ConnectionKind::Decomposed, _) => {
                vec![spec(ConstraintMode::Point), spec(ConstraintMode::Orient)]
            }
            (ConnectionKind::Direct, ChannelMask::TRANSLATION) => vec![spec(ConstraintMode::Point)],
            (ConnectionKind::Direct, ChannelMask::ROTATION) => vec![spec(ConstraintMode::Orient)],
            (ConnectionKind::Direct, _) => vec![spec(ConstraintMode::Parent)],
        }
    }

    /// Realize the connection on the host. Binding a bound connection is a no-op.
    ///
    /// This does not check driven exclusivity; use [`ConnectionRegistry::bind`] for
    /// connections held in a registry.
    pub fn bind<H>(&mut self, host: &mut H) -> Result<()>
    where
        H: NodeResolver + ConstraintHost + ?Sized,
    {
        if self.is_bound() {
            return Ok(());
        }
        ConstraintBinder.realize(host, self)?;
        info!("bound {}", self.key);
        Ok(())
    }

    /// Release the live constraints. Unbinding an unbound connection is a no-op.
    pub fn unbind<H>(&mut self, host: &mut H) -> Result<ReleaseReport>
    where
        H: ConstraintHost + ?Sized,
    {
        if !self.is_bound() {
            return Ok(ReleaseReport::default());
        }
        let report = ConstraintBinder.release(host, self)?;
        info!("unbound {}", self.key);
        Ok(report)
    }
}
