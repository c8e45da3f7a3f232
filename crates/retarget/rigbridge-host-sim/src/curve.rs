//! Keyframe curves for one node's translation and rotation.

use nalgebra::{UnitQuaternion, Vector3};
use rigbridge_core::{KeyInterpolation, Pose};
use rigbridge_core::transform::compose;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransformKey {
    pub frame: i64,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// Interpolation towards the next key. The simulated host treats
    /// [`KeyInterpolation::HostDefault`] as stepped.
    pub interpolation: KeyInterpolation,
}

/// Keys sorted by frame, at most one per frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformCurve {
    keys: Vec<TransformKey>,
}

impl TransformCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[TransformKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert a key, replacing any key already on that frame.
    pub fn insert(&mut self, key: TransformKey) {
        match self.keys.binary_search_by_key(&key.frame, |k| k.frame) {
            Ok(i) => self.keys[i] = key,
            Err(i) => self.keys.insert(i, key),
        }
    }

    pub fn key_at(&self, frame: i64) -> Option<&TransformKey> {
        self.keys
            .binary_search_by_key(&frame, |k| k.frame)
            .ok()
            .map(|i| &self.keys[i])
    }

    /// Local pose at `frame`, holding the first and last keys outside the keyed range.
    pub fn sample(&self, frame: i64) -> Option<Pose> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if frame <= first.frame {
            return Some(compose(first.translation, first.rotation));
        }
        if frame >= last.frame {
            return Some(compose(last.translation, last.rotation));
        }
        let i = match self.keys.binary_search_by_key(&frame, |k| k.frame) {
            Ok(i) => return Some(compose(self.keys[i].translation, self.keys[i].rotation)),
            Err(i) => i,
        };
        let (a, b) = (&self.keys[i - 1], &self.keys[i]);
        if a.interpolation == KeyInterpolation::HostDefault {
            return Some(compose(a.translation, a.rotation));
        }
        let u = (frame - a.frame) as f64 / (b.frame - a.frame) as f64;
        let translation = a.translation.lerp(&b.translation, u);
        let rotation = a.rotation.slerp(&b.rotation, u);
        Some(compose(translation, rotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn key(frame: i64, x: f64, deg: f64) -> TransformKey {
        TransformKey {
            frame,
            translation: Vector3::new(x, 0.0, 0.0),
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), deg.to_radians()),
            interpolation: KeyInterpolation::Linear,
        }
    }

    #[test]
    fn empty_curve_has_no_sample() {
        assert!(TransformCurve::new().sample(3).is_none());
    }

    #[test]
    fn linear_between_keys_and_held_outside() {
        let mut c = TransformCurve::new();
        c.insert(key(10, 9.0, 90.0));
        c.insert(key(1, 0.0, 0.0));
        assert_eq!(c.keys()[0].frame, 1);

        let mid = c.sample(4).unwrap();
        assert_relative_eq!(mid.translation.vector.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(mid.rotation.angle(), 30f64.to_radians(), epsilon = 1e-12);

        assert_relative_eq!(c.sample(-5).unwrap().translation.vector.x, 0.0);
        assert_relative_eq!(c.sample(50).unwrap().translation.vector.x, 9.0);
    }

    #[test]
    fn insert_replaces_same_frame() {
        let mut c = TransformCurve::new();
        c.insert(key(2, 1.0, 0.0));
        c.insert(key(2, 5.0, 0.0));
        assert_eq!(c.len(), 1);
        assert_relative_eq!(c.key_at(2).unwrap().translation.x, 5.0);
    }

    #[test]
    fn host_default_holds_until_next_key() {
        let mut c = TransformCurve::new();
        let mut a = key(0, 0.0, 0.0);
        a.interpolation = KeyInterpolation::HostDefault;
        c.insert(a);
        c.insert(key(10, 10.0, 0.0));
        assert_relative_eq!(c.sample(9).unwrap().translation.vector.x, 0.0);
        assert_relative_eq!(c.sample(10).unwrap().translation.vector.x, 10.0);
    }
}
