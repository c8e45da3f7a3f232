//! Rigbridge simulated host
//!
//! An in-memory implementation of every host collaborator trait of `rigbridge-core`:
//! a parented node hierarchy, linear keyframe curves, live point/orient/parent constraints,
//! connection markers, and JSON scene/clip files kept in a file table. It plays the part of
//! the DCC application for tests, benchmarks and tooling.

pub mod batch;
pub mod curve;
pub mod document;
pub mod host_impl;
pub mod scene;

pub use curve::{TransformCurve, TransformKey};
pub use document::{
    ClipDocument, ConstraintDoc, ExportDocument, KeyDoc, NodeDoc, SceneDocument, TrackDoc,
};
pub use scene::{ChannelLocks, SimScene};
