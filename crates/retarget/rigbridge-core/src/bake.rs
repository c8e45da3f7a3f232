//! Bake engine: sample the live-driven rig into keyframes, then tear the constraints down.
//!
//! One bake walks `Idle → Sampling → Writing → TearingDown → Done`. A sampling failure stops
//! in `Failed` with the rig untouched; write failures are collected, teardown still runs, and
//! the bake ends in `Failed` with the summary. The host's current frame is restored in every
//! case once the range has been validated.

use std::ops::RangeInclusive;

use log::{debug, error, info, trace, warn};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::binder::ConstraintBinder;
use crate::error::{RetargetError, Result};
use crate::host::Host;
use crate::ids::{ConnectionKey, ConstraintHandle, NodeHandle};
use crate::registry::ConnectionRegistry;
use crate::transform::{decompose, euler_xyz_degrees, Pose};

/// Upper bound on the per-controller sample buffer reserved up front.
const PREALLOC_FRAMES: usize = 4096;

/// Closed frame interval.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BakeRange {
    pub start: i64,
    pub end: i64,
}

impl BakeRange {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(RetargetError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of frames, inclusive of both ends. Zero for an invalid range, saturating at
    /// `usize::MAX` for spans wider than the address space.
    pub fn frame_count(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        usize::try_from(self.end.abs_diff(self.start))
            .ok()
            .and_then(|span| span.checked_add(1))
            .unwrap_or(usize::MAX)
    }

    pub fn frames(&self) -> RangeInclusive<i64> {
        self.start..=self.end
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum BakeState {
    #[default]
    Idle,
    Sampling,
    Writing,
    TearingDown,
    Done,
    Failed,
}

/// Local transform of one driven controller at one frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeyframeSample {
    pub frame: i64,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl KeyframeSample {
    pub fn from_pose(frame: i64, local: &Pose) -> Self {
        let (translation, rotation) = decompose(local);
        Self {
            frame,
            translation,
            rotation,
        }
    }

    /// For hosts that key Euler channels (XYZ, degrees).
    pub fn euler_xyz_degrees(&self) -> [f64; 3] {
        euler_xyz_degrees(&self.rotation)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyInterpolation {
    #[default]
    Linear,
    HostDefault,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    pub interpolation: KeyInterpolation,
    /// Remove the scene markers of baked connections during teardown.
    pub remove_markers: bool,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            interpolation: KeyInterpolation::Linear,
            remove_markers: true,
        }
    }
}

/// Progress notification passed to the callback of [`BakeEngine::bake_with_progress`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BakeProgress {
    pub state: BakeState,
    pub frame: Option<i64>,
    pub frames_done: usize,
    pub frames_total: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub driven: String,
    pub frame: i64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BakeReport {
    pub range: BakeRange,
    pub frames_sampled: usize,
    pub controllers_baked: usize,
    pub keys_written: usize,
    pub baked: Vec<ConnectionKey>,
    pub write_failures: Vec<WriteFailure>,
    /// Stale handles met during teardown (recoverable).
    pub release_warnings: Vec<RetargetError>,
    /// Handles the host refused to destroy; the connection was still removed from the registry.
    pub release_failures: Vec<RetargetError>,
    /// Constraints still live after teardown, for the caller to retry or remove by hand.
    pub unreleased: Vec<ConstraintHandle>,
    pub marker_failures: Vec<RetargetError>,
}

impl BakeReport {
    fn new(range: BakeRange) -> Self {
        Self {
            range,
            frames_sampled: 0,
            controllers_baked: 0,
            keys_written: 0,
            baked: Vec::new(),
            write_failures: Vec::new(),
            release_warnings: Vec::new(),
            release_failures: Vec::new(),
            unreleased: Vec::new(),
            marker_failures: Vec::new(),
        }
    }

    /// No write, release or marker failure.
    pub fn is_clean(&self) -> bool {
        self.write_failures.is_empty()
            && self.release_failures.is_empty()
            && self.marker_failures.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default)]
pub struct BakeEngine {
    state: BakeState,
    cfg: BakeConfig,
    binder: ConstraintBinder,
}

struct Target {
    key: ConnectionKey,
    node: NodeHandle,
    samples: Vec<KeyframeSample>,
}

impl BakeEngine {
    pub fn new(cfg: BakeConfig) -> Self {
        Self {
            state: BakeState::Idle,
            cfg,
            binder: ConstraintBinder,
        }
    }

    /// State reached by the last bake.
    pub fn state(&self) -> BakeState {
        self.state
    }

    pub fn config(&self) -> &BakeConfig {
        &self.cfg
    }

    /// Bake every bound connection of `registry` over `range` (host playback range if `None`).
    pub fn bake<H>(
        &mut self,
        host: &mut H,
        registry: &mut ConnectionRegistry,
        range: Option<BakeRange>,
    ) -> Result<BakeReport>
    where
        H: Host + ?Sized,
    {
        self.bake_with_progress(host, registry, range, &mut |_| {})
    }

    pub fn bake_with_progress<H>(
        &mut self,
        host: &mut H,
        registry: &mut ConnectionRegistry,
        range: Option<BakeRange>,
        progress: &mut dyn FnMut(&BakeProgress),
    ) -> Result<BakeReport>
    where
        H: Host + ?Sized,
    {
        let range = range.unwrap_or_else(|| host.playback_range());
        range.validate()?;

        let saved_frame = host.current_frame();
        self.state = BakeState::Idle;
        info!("bake [{}, {}] from frame {saved_frame}", range.start, range.end);

        let outcome = self.run(host, registry, range, progress);

        host.set_current_frame(saved_frame);
        match &outcome {
            Ok(report) => info!(
                "bake {:?}: {} controllers, {} keys, {} write failures",
                self.state,
                report.controllers_baked,
                report.keys_written,
                report.write_failures.len()
            ),
            Err(err) => error!("bake failed: {err}"),
        }
        outcome
    }

    fn enter(
        &mut self,
        state: BakeState,
        frames_total: usize,
        frames_done: usize,
        progress: &mut dyn FnMut(&BakeProgress),
    ) {
        debug!("bake {:?} -> {:?}", self.state, state);
        self.state = state;
        progress(&BakeProgress {
            state,
            frame: None,
            frames_done,
            frames_total,
        });
    }

    fn run<H>(
        &mut self,
        host: &mut H,
        registry: &mut ConnectionRegistry,
        range: BakeRange,
        progress: &mut dyn FnMut(&BakeProgress),
    ) -> Result<BakeReport>
    where
        H: Host + ?Sized,
    {
        let total = range.frame_count();
        let mut report = BakeReport::new(range);

        let mut targets = Vec::new();
        for conn in registry.list().filter(|c| c.is_bound()) {
            let Some(node) = host.resolve(conn.driven()) else {
                self.enter(BakeState::Failed, total, 0, progress);
                return Err(RetargetError::NotFound {
                    what: conn.driven().to_string(),
                });
            };
            targets.push(Target {
                key: conn.key().clone(),
                node,
                samples: Vec::with_capacity(total.min(PREALLOC_FRAMES)),
            });
        }
        if targets.is_empty() {
            self.enter(BakeState::Done, total, 0, progress);
            return Ok(report);
        }

        self.enter(BakeState::Sampling, total, 0, progress);
        for (done, frame) in range.frames().enumerate() {
            host.set_current_frame(frame);
            for target in &mut targets {
                let local = match host.local_transform(target.node) {
                    Ok(local) => local,
                    Err(err) => {
                        self.enter(BakeState::Failed, total, done, progress);
                        return Err(RetargetError::Host {
                            reason: format!("sampling {} at {frame}: {err}", target.key.driven),
                        });
                    }
                };
                trace!("{} @ {frame}: {local:?}", target.key.driven);
                target.samples.push(KeyframeSample::from_pose(frame, &local));
            }
            progress(&BakeProgress {
                state: BakeState::Sampling,
                frame: Some(frame),
                frames_done: done + 1,
                frames_total: total,
            });
        }
        report.frames_sampled = total;

        self.enter(BakeState::Writing, total, total, progress);
        for target in &targets {
            for sample in &target.samples {
                match host.set_keyframe(target.node, sample, self.cfg.interpolation) {
                    Ok(()) => report.keys_written += 1,
                    Err(err) => {
                        warn!("key {} @ {}: {err}", target.key.driven, sample.frame);
                        report.write_failures.push(WriteFailure {
                            driven: target.key.driven.clone(),
                            frame: sample.frame,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        self.enter(BakeState::TearingDown, total, total, progress);
        for target in &targets {
            let key = &target.key;
            if let Some(mut conn) = registry.remove(&key.driver, &key.driven) {
                match self.binder.release(host, &mut conn) {
                    Ok(released) => report.release_warnings.extend(released.warnings),
                    Err(err) => {
                        report.unreleased.extend_from_slice(conn.handles());
                        report.release_failures.push(err);
                    }
                }
            }
            if self.cfg.remove_markers {
                if let Err(err) = host.remove_marker(&key.driver, &key.driven) {
                    warn!("marker of {key} not removed: {err}");
                    report.marker_failures.push(err.into());
                }
            }
            report.baked.push(key.clone());
        }
        report.controllers_baked = report.baked.len();

        let end = if report.write_failures.is_empty() {
            BakeState::Done
        } else {
            BakeState::Failed
        };
        self.enter(end, total, total, progress);
        Ok(report)
    }
}
