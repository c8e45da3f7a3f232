mod common;

use approx::assert_relative_eq;
use nalgebra::Vector3;
use rigbridge_core::{
    BakeRange, BakeState, ConstraintHost, KeyInterpolation, MarkerStore, Pose, RetargetConfig,
    RetargetError, Retargeter, TimeControl,
};
use rigbridge_host_sim::SimScene;

use common::*;

/// Live-evaluated world poses of `node` over `range`, restoring the frame afterwards.
fn live_poses(scene: &mut SimScene, node: &str, range: BakeRange) -> Vec<(i64, Pose)> {
    let saved = scene.current_frame();
    let poses = range
        .frames()
        .map(|f| {
            scene.set_current_frame(f);
            (f, world(scene, node))
        })
        .collect();
    scene.set_current_frame(saved);
    poses
}

fn waving_elbow() -> (SimScene, Retargeter) {
    let mut scene = biped_arm();
    import(&mut scene, "elbow-wave");
    let mut rt = Retargeter::default();
    rt.connect(&mut scene, "joint_L_elbow", "ctrl_L_elbow").unwrap();
    (scene, rt)
}

#[test]
fn elbow_wave_bakes_ten_matching_keys() {
    let mut scene = biped_arm();
    import(&mut scene, "elbow-wave");
    assert_relative_eq!(
        world(&scene, "ctrl_L_elbow").translation.vector,
        Vector3::new(3.0, 0.0, 0.0)
    );

    let mut rt = Retargeter::default();
    rt.connect(&mut scene, "joint_L_elbow", "ctrl_L_elbow").unwrap();
    assert_relative_eq!(
        world(&scene, "ctrl_L_elbow").translation.vector,
        Vector3::new(3.0, 0.0, 0.0),
        epsilon = EPS
    );
    assert!(matches!(
        rt.connect(&mut scene, "joint_L_wrist", "ctrl_L_elbow"),
        Err(RetargetError::DrivenAlreadyBound { .. })
    ));

    let range = BakeRange::new(1, 10).unwrap();
    let expected = live_poses(&mut scene, "ctrl_L_elbow", range);
    let report = rt.bake(&mut scene, Some(range)).unwrap();

    assert!(report.is_clean());
    assert_eq!(rt.bake_state(), BakeState::Done);
    assert_eq!(report.frames_sampled, 10);
    assert_eq!(report.controllers_baked, 1);
    assert_eq!(report.keys_written, 10);
    assert_eq!(report.baked, vec![key("joint_L_elbow", "ctrl_L_elbow")]);

    let curve = scene.curve("ctrl_L_elbow").unwrap();
    assert_eq!(curve.len(), 10);
    for ((frame, pose), k) in expected.iter().zip(curve.keys()) {
        assert_eq!(k.frame, *frame);
        assert_relative_eq!(k.translation, pose.translation.vector, epsilon = EPS);
        assert_relative_eq!(k.rotation.angle_to(&pose.rotation), 0.0, epsilon = EPS);
    }
    let last = curve.key_at(10).unwrap();
    let half = std::f64::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(last.translation, Vector3::new(2.0 + half, half, 0.0), epsilon = EPS);
    assert_relative_eq!(last.rotation.angle(), 45f64.to_radians(), epsilon = EPS);

    assert_eq!(scene.constraint_count(), 0);
    assert!(rt.registry().is_empty());
    assert!(scene.list_markers().unwrap().is_empty());

    // reversed range: rejected, nothing changes
    let frame = scene.current_frame();
    let err = rt
        .bake(&mut scene, Some(BakeRange { start: 10, end: 1 }))
        .unwrap_err();
    assert_eq!(err, RetargetError::InvalidRange { start: 10, end: 1 });
    assert_eq!(rt.bake_state(), BakeState::Done);
    assert_eq!(scene.current_frame(), frame);
    assert_eq!(scene.curve("ctrl_L_elbow").unwrap().len(), 10);
}

#[test]
fn baked_controller_replays_the_motion() {
    let (mut scene, mut rt) = waving_elbow();
    let range = BakeRange::new(1, 10).unwrap();
    let expected = live_poses(&mut scene, "ctrl_L_elbow", range);
    rt.bake(&mut scene, Some(range)).unwrap();

    for (frame, pose) in expected {
        scene.set_current_frame(frame);
        let now = world(&scene, "ctrl_L_elbow");
        assert_relative_eq!(now.translation.vector, pose.translation.vector, epsilon = EPS);
    }
}

#[test]
fn key_count_matches_the_range() {
    let (mut scene, mut rt) = waving_elbow();
    let report = rt.bake(&mut scene, Some(BakeRange::new(3, 7).unwrap())).unwrap();
    assert_eq!(report.keys_written, 5);
    let frames: Vec<_> = scene
        .curve("ctrl_L_elbow")
        .unwrap()
        .keys()
        .iter()
        .map(|k| k.frame)
        .collect();
    assert_eq!(frames, vec![3, 4, 5, 6, 7]);
}

#[test]
fn default_range_is_the_playback_range() {
    let (mut scene, mut rt) = waving_elbow();
    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(report.range, BakeRange { start: 1, end: 10 });
    assert_eq!(report.keys_written, 10);
}

#[test]
fn child_controller_connected_first_tracks_its_driver() {
    let mut scene = fk_chain();
    import(&mut scene, "shoulder-slide");
    let mut rt = Retargeter::default();
    rt.connect(&mut scene, "joint_L_elbow", "ctrl_L_elbow_fk").unwrap();
    rt.connect(&mut scene, "joint_L_shoulder", "ctrl_L_shoulder_fk").unwrap();

    scene.set_current_frame(10);
    assert_relative_eq!(
        world(&scene, "ctrl_L_shoulder_fk").translation.vector,
        Vector3::new(6.0, 0.0, 0.0),
        epsilon = EPS
    );
    assert_relative_eq!(
        world(&scene, "ctrl_L_elbow_fk").translation.vector,
        world(&scene, "joint_L_elbow").translation.vector,
        epsilon = EPS
    );
    scene.set_current_frame(1);

    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(report.controllers_baked, 2);
    let elbow = scene.curve("ctrl_L_elbow_fk").unwrap();
    for k in elbow.keys() {
        assert_relative_eq!(k.translation, Vector3::new(1.0, 0.0, 0.0), epsilon = EPS);
    }
    scene.set_current_frame(10);
    assert_relative_eq!(
        world(&scene, "ctrl_L_elbow_fk").translation.vector,
        Vector3::new(7.0, 0.0, 0.0),
        epsilon = EPS
    );
}

#[test]
fn widest_range_with_nothing_bound_is_done() {
    let mut scene = biped_arm();
    let mut rt = Retargeter::default();
    let range = BakeRange::new(i64::MIN, i64::MAX).unwrap();
    let report = rt.bake(&mut scene, Some(range)).unwrap();
    assert_eq!(rt.bake_state(), BakeState::Done);
    assert_eq!(report.controllers_baked, 0);
    assert_eq!(scene.current_frame(), 1);
}

#[test]
fn current_frame_is_restored() {
    let (mut scene, mut rt) = waving_elbow();
    scene.set_current_frame(4);
    rt.bake(&mut scene, Some(BakeRange::new(1, 10).unwrap())).unwrap();
    assert_eq!(scene.current_frame(), 4);
}

#[test]
fn write_failures_still_tear_down() {
    let (mut scene, mut rt) = waving_elbow();
    scene.set_keyable("ctrl_L_elbow", false).unwrap();

    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(rt.bake_state(), BakeState::Failed);
    assert_eq!(report.write_failures.len(), 10);
    assert_eq!(report.keys_written, 0);
    assert!(!report.is_clean());
    assert_eq!(scene.constraint_count(), 0);
    assert!(rt.registry().is_empty());
}

#[test]
fn refused_teardown_is_reported_and_the_entry_dropped() {
    let (mut scene, mut rt) = waving_elbow();
    let live = handles(&rt, "joint_L_elbow", "ctrl_L_elbow");
    scene.pin_constraint(live[0]);

    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(report.release_failures.len(), 1);
    assert!(!report.is_clean());
    assert!(rt.registry().is_empty());

    // the refused handle is handed back so it can still be removed
    assert_eq!(report.unreleased, vec![live[0]]);
    assert_eq!(scene.constraint_count(), 1);
    scene.unpin_constraint(live[0]);
    scene.destroy_constraint(report.unreleased[0]).unwrap();
    assert_eq!(scene.constraint_count(), 0);
}

#[test]
fn empty_registry_bakes_nothing() {
    let mut scene = biped_arm();
    let mut rt = Retargeter::default();
    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(rt.bake_state(), BakeState::Done);
    assert_eq!(report.frames_sampled, 0);
    assert_eq!(report.keys_written, 0);
    assert!(report.is_clean());
}

#[test]
fn unbound_connections_are_left_alone() {
    let (mut scene, mut rt) = waving_elbow();
    rt.connect(&mut scene, "joint_L_shoulder", "ctrl_L_shoulder").unwrap();
    rt.unbind(&mut scene, "joint_L_shoulder", "ctrl_L_shoulder").unwrap();

    let report = rt.bake(&mut scene, None).unwrap();
    assert_eq!(report.controllers_baked, 1);
    assert!(scene.curve("ctrl_L_shoulder").unwrap().is_empty());
    let left: Vec<_> = rt.list().map(|c| c.key().clone()).collect();
    assert_eq!(left, vec![key("joint_L_shoulder", "ctrl_L_shoulder")]);
    assert_eq!(scene.list_markers().unwrap().len(), 1);
}

#[test]
fn missing_controller_fails_before_sampling() {
    let (mut scene, mut rt) = waving_elbow();
    scene.remove_node("ctrl_L_elbow").unwrap();

    let err = rt.bake(&mut scene, None).unwrap_err();
    assert!(matches!(err, RetargetError::NotFound { .. }));
    assert_eq!(rt.bake_state(), BakeState::Failed);
    assert_eq!(rt.registry().len(), 1);
}

#[test]
fn progress_reports_every_frame_and_transition() {
    let (mut scene, mut rt) = waving_elbow();
    let mut states = Vec::new();
    let mut frames = Vec::new();
    rt.bake_with_progress(&mut scene, None, &mut |p| match p.frame {
        Some(f) => frames.push((f, p.frames_done, p.frames_total)),
        None => states.push(p.state),
    })
    .unwrap();

    assert_eq!(
        states,
        vec![
            BakeState::Sampling,
            BakeState::Writing,
            BakeState::TearingDown,
            BakeState::Done
        ]
    );
    assert_eq!(frames.len(), 10);
    assert_eq!(frames[0], (1, 1, 10));
    assert_eq!(frames[9], (10, 10, 10));
}

#[test]
fn ik_controller_bakes_translation_and_rotation() {
    let mut scene = biped_arm();
    import(&mut scene, "root-walk");
    let mut rt = Retargeter::default();
    rt.connect_ik(&mut scene, "joint_L_wrist", "ctrl_L_hand_ik").unwrap();

    rt.bake(&mut scene, None).unwrap();
    let curve = scene.curve("ctrl_L_hand_ik").unwrap();
    assert_eq!(curve.len(), 10);
    let first = curve.key_at(1).unwrap();
    let last = curve.key_at(10).unwrap();
    assert_relative_eq!(first.translation, Vector3::new(3.0, 0.0, 0.5), epsilon = EPS);
    assert_relative_eq!(last.translation, Vector3::new(3.0, 0.0, 5.0), epsilon = EPS);
    assert_relative_eq!(last.rotation.angle(), 90f64.to_radians(), epsilon = EPS);
}

#[test]
fn configured_interpolation_reaches_the_keys() {
    let mut cfg = RetargetConfig::default();
    cfg.bake.interpolation = KeyInterpolation::HostDefault;
    let mut scene = biped_arm();
    import(&mut scene, "elbow-wave");
    let mut rt = Retargeter::new(cfg);
    rt.connect(&mut scene, "joint_L_elbow", "ctrl_L_elbow").unwrap();

    rt.bake(&mut scene, Some(BakeRange::new(1, 2).unwrap())).unwrap();
    let curve = scene.curve("ctrl_L_elbow").unwrap();
    assert!(curve
        .keys()
        .iter()
        .all(|k| k.interpolation == KeyInterpolation::HostDefault));
}

#[test]
fn bake_report_serializes() {
    let (mut scene, mut rt) = waving_elbow();
    let report = rt.bake(&mut scene, None).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["keys_written"], 10);
    assert_eq!(json["baked"][0]["driven"], "ctrl_L_elbow");
}
