//! Collaborator trait implementations for [`SimScene`].

use log::{debug, trace};
use nalgebra::Vector3;

use rigbridge_core::transform::{compose, world_to_local};
use rigbridge_core::{
    BakeRange, ConnectionMarker, ConstraintHandle, ConstraintHost, ConstraintMode,
    ConstraintSpec, HostError, KeyInterpolation, KeyframeSample, Keyframer, MarkerStore,
    NodeHandle, NodeResolver, Pose, TimeControl, TransformQuery,
};

use crate::curve::TransformKey;
use crate::scene::{SimConstraint, SimScene};

impl NodeResolver for SimScene {
    fn resolve(&self, id: &str) -> Option<NodeHandle> {
        self.handle_of(id).ok()
    }
}

impl TransformQuery for SimScene {
    fn world_transform(&self, node: NodeHandle) -> Result<Pose, HostError> {
        self.world_of(node)
    }

    fn local_transform(&self, node: NodeHandle) -> Result<Pose, HostError> {
        Ok(self.node(node)?.local)
    }

    fn set_world_translation(
        &mut self,
        node: NodeHandle,
        translation: &Vector3<f64>,
    ) -> Result<(), HostError> {
        let current = self.node(node)?;
        if current.locks.translation {
            return Err(HostError::Locked {
                node: current.name.clone(),
                channel: "translate",
            });
        }
        if !current.curve.is_empty() {
            return Err(HostError::Rejected(format!(
                "{} is animated; move its keys instead",
                current.name
            )));
        }
        let world = self.world_of(node)?;
        let target = compose(*translation, world.rotation);
        let local = world_to_local(&self.parent_world(node)?, &target);
        self.node_mut(node)?.rest = local;
        self.evaluate();
        Ok(())
    }
}

impl ConstraintHost for SimScene {
    fn create_constraint(
        &mut self,
        driver: NodeHandle,
        driven: NodeHandle,
        spec: &ConstraintSpec,
    ) -> Result<ConstraintHandle, HostError> {
        self.node(driver)?;
        let target = self.node(driven)?;
        let (needs_t, needs_r) = match spec.mode {
            ConstraintMode::Parent => (true, true),
            ConstraintMode::Point => (true, false),
            ConstraintMode::Orient => (false, true),
        };
        if needs_t && target.locks.translation {
            return Err(HostError::Locked {
                node: target.name.clone(),
                channel: "translate",
            });
        }
        if needs_r && target.locks.rotation {
            return Err(HostError::Locked {
                node: target.name.clone(),
                channel: "rotate",
            });
        }
        if self.is_ancestor(driven, driver) {
            return Err(HostError::Cycle {
                driver: self.node(driver)?.name.clone(),
                driven: target.name.clone(),
            });
        }
        Ok(self.insert_constraint(SimConstraint {
            driver,
            driven,
            spec: *spec,
        }))
    }

    fn destroy_constraint(&mut self, handle: ConstraintHandle) -> Result<(), HostError> {
        if self.pinned.contains(&handle) {
            return Err(HostError::Rejected(format!("{handle} is referenced")));
        }
        if self.constraints.remove(&handle).is_none() {
            return Err(HostError::StaleHandle(handle));
        }
        debug!("destroyed {handle}");
        self.evaluate();
        Ok(())
    }

    fn constraints_between(&self, driver: NodeHandle, driven: NodeHandle) -> Vec<ConstraintHandle> {
        self.constraints
            .iter()
            .filter(|(_, c)| c.driver == driver && c.driven == driven)
            .map(|(h, _)| *h)
            .collect()
    }
}

impl TimeControl for SimScene {
    fn current_frame(&self) -> i64 {
        self.frame
    }

    fn set_current_frame(&mut self, frame: i64) {
        trace!("frame {frame}");
        self.frame = frame;
        self.evaluate();
    }

    fn playback_range(&self) -> BakeRange {
        self.playback
    }
}

impl Keyframer for SimScene {
    fn set_keyframe(
        &mut self,
        node: NodeHandle,
        sample: &KeyframeSample,
        interpolation: KeyInterpolation,
    ) -> Result<(), HostError> {
        let target = self.node_mut(node)?;
        if !target.keyable {
            return Err(HostError::NotKeyable(target.name.clone()));
        }
        target.curve.insert(TransformKey {
            frame: sample.frame,
            translation: sample.translation,
            rotation: sample.rotation,
            interpolation,
        });
        self.evaluate();
        Ok(())
    }
}

impl MarkerStore for SimScene {
    fn list_markers(&self) -> Result<Vec<ConnectionMarker>, HostError> {
        Ok(self.markers.clone())
    }

    fn write_marker(&mut self, marker: &ConnectionMarker) -> Result<(), HostError> {
        match self
            .markers
            .iter_mut()
            .find(|m| m.driver == marker.driver && m.driven == marker.driven)
        {
            Some(existing) => *existing = marker.clone(),
            None => self.markers.push(marker.clone()),
        }
        Ok(())
    }

    /// Removing a marker that is not there is a no-op.
    fn remove_marker(&mut self, driver: &str, driven: &str) -> Result<(), HostError> {
        self.markers
            .retain(|m| !(m.driver == driver && m.driven == driven));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn spec(mode: ConstraintMode, t: Vector3<f64>) -> ConstraintSpec {
        ConstraintSpec {
            mode,
            offset_translation: t,
            offset_rotation: UnitQuaternion::identity(),
        }
    }

    fn two_nodes() -> (SimScene, NodeHandle, NodeHandle) {
        let mut s = SimScene::new();
        let a = s
            .add_node("a", None, compose(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()))
            .unwrap();
        let b = s.add_node("b", None, Pose::identity()).unwrap();
        (s, a, b)
    }

    #[test]
    fn constraints_apply_immediately_and_release() {
        let (mut s, a, b) = two_nodes();
        let h = s
            .create_constraint(a, b, &spec(ConstraintMode::Point, Vector3::new(0.0, 1.0, 0.0)))
            .unwrap();
        assert_relative_eq!(s.world_of(b).unwrap().translation.vector, Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(s.constraints_between(a, b), vec![h]);
        assert!(s.constraints_between(b, a).is_empty());

        s.destroy_constraint(h).unwrap();
        assert_relative_eq!(s.world_of(b).unwrap().translation.vector, Vector3::zeros());
        assert_eq!(s.destroy_constraint(h), Err(HostError::StaleHandle(h)));
    }

    #[test]
    fn locks_are_checked_per_mode() {
        let (mut s, a, b) = two_nodes();
        s.lock("b", crate::ChannelLocks { translation: false, rotation: true }).unwrap();
        let orient = spec(ConstraintMode::Orient, Vector3::zeros());
        assert!(matches!(
            s.create_constraint(a, b, &orient),
            Err(HostError::Locked { channel: "rotate", .. })
        ));
        assert!(s
            .create_constraint(a, b, &spec(ConstraintMode::Point, Vector3::zeros()))
            .is_ok());
    }

    #[test]
    fn pinned_constraints_refuse_destruction() {
        let (mut s, a, b) = two_nodes();
        let h = s
            .create_constraint(a, b, &spec(ConstraintMode::Parent, Vector3::zeros()))
            .unwrap();
        s.pin_constraint(h);
        assert!(matches!(s.destroy_constraint(h), Err(HostError::Rejected(_))));
        s.unpin_constraint(h);
        assert!(s.destroy_constraint(h).is_ok());
    }

    #[test]
    fn keyframes_require_keyable_nodes() {
        let (mut s, _, b) = two_nodes();
        let sample = KeyframeSample::from_pose(3, &Pose::identity());
        s.set_keyable("b", false).unwrap();
        assert_eq!(
            s.set_keyframe(b, &sample, KeyInterpolation::Linear),
            Err(HostError::NotKeyable("b".into()))
        );
        s.set_keyable("b", true).unwrap();
        s.set_keyframe(b, &sample, KeyInterpolation::Linear).unwrap();
        assert_eq!(s.curve("b").unwrap().len(), 1);
    }

    #[test]
    fn markers_upsert_by_pair() {
        let mut s = SimScene::new();
        let mut m = ConnectionMarker {
            name: "a_TRAN_ROT".into(),
            driver: "a".into(),
            driven: "b".into(),
            kind: Default::default(),
            channels: Default::default(),
            offset_translation: [0.0; 3],
            offset_rotation: [0.0, 0.0, 0.0, 1.0],
            color: Default::default(),
        };
        s.write_marker(&m).unwrap();
        m.offset_translation = [1.0, 2.0, 3.0];
        s.write_marker(&m).unwrap();
        assert_eq!(s.list_markers().unwrap(), vec![m]);
        s.remove_marker("a", "b").unwrap();
        s.remove_marker("a", "b").unwrap();
        assert!(s.list_markers().unwrap().is_empty());
    }
}
