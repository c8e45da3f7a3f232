#![allow(dead_code)]

use nalgebra::{UnitQuaternion, Vector3};
use rigbridge_core::transform::compose;
use rigbridge_core::{BatchHost, ConnectionKey, ConstraintHandle, Pose, Retargeter};
use rigbridge_host_sim::{SceneDocument, SimScene, TransformCurve, TransformKey};
use rigbridge_test_fixtures::{clips, rigs};

pub const EPS: f64 = 1e-9;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rig(name: &str) -> SimScene {
    init_logger();
    let doc: SceneDocument = rigs::load(name).expect("rig fixture");
    SimScene::from_document(&doc).expect("rig scene")
}

/// The `biped-arm` rig: a three-joint arm plus a control rig parented under `rig_root`.
pub fn biped_arm() -> SimScene {
    rig("biped-arm")
}

/// The `fk-chain` rig: FK controllers where the elbow control is a child of the shoulder's.
pub fn fk_chain() -> SimScene {
    rig("fk-chain")
}

/// Import a fixture clip through the scene's file table.
pub fn import(scene: &mut SimScene, clip: &str) {
    let path = clips::path(clip).expect("clip path");
    scene.put_file(&path, clips::json(clip).expect("clip json"));
    scene.import_clip(&path).expect("clip import");
}

pub fn world(scene: &SimScene, name: &str) -> Pose {
    scene.world(name).expect("node in scene")
}

pub fn handles(rt: &Retargeter, driver: &str, driven: &str) -> Vec<ConstraintHandle> {
    rt.registry()
        .get(driver, driven)
        .expect("connection registered")
        .handles()
        .to_vec()
}

pub fn key(driver: &str, driven: &str) -> ConnectionKey {
    ConnectionKey::new(driver, driven)
}

/// Hold a node at one local pose for the whole timeline.
pub fn pin_pose(
    scene: &mut SimScene,
    name: &str,
    translation: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
) {
    let mut curve = TransformCurve::new();
    curve.insert(TransformKey {
        frame: 1,
        translation,
        rotation,
        interpolation: Default::default(),
    });
    scene.set_curve(name, curve).expect("node in scene");
}

pub fn at(x: f64, y: f64, z: f64) -> Pose {
    compose(Vector3::new(x, y, z), UnitQuaternion::identity())
}

pub fn about_z(degrees: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), degrees.to_radians())
}
