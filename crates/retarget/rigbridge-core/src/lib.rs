//! Rigbridge core (host-agnostic)
//!
//! Retargeting between a driving skeleton and a control rig: connections with frozen
//! offsets, a registry persisted through scene markers, live constraint binding, and a
//! bake loop that turns the driven rig into keyframes. Everything that touches the scene
//! goes through the collaborator traits in [`host`].

pub mod bake;
pub mod batch;
pub mod binder;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod ids;
pub mod marker;
pub mod registry;
pub mod retargeter;
pub mod transform;

// Re-exports for adapters
pub use bake::{
    BakeConfig, BakeEngine, BakeProgress, BakeRange, BakeReport, BakeState, KeyInterpolation,
    KeyframeSample, WriteFailure,
};
pub use batch::{
    run_batch, run_batch_with_progress, BatchHost, BatchJob, BatchProgress, BatchReport,
    ClipOutcome, ClipResult, ExportFormat,
};
pub use binder::{ConstraintBinder, ReleaseReport};
pub use config::{DiscoverConfig, RetargetConfig};
pub use connection::{
    ChannelMask, Connection, ConnectionKind, ConnectionOffset, CreateOptions, MarkerColor,
};
pub use error::{HostError, Result, RetargetError};
pub use host::{
    ConstraintHost, ConstraintMode, ConstraintSpec, Host, Keyframer, MarkerStore, NodeResolver,
    TimeControl, TransformQuery,
};
pub use ids::{ConnectionKey, ConstraintHandle, HandleAllocator, NodeHandle};
pub use marker::{markers_from_json, markers_to_json, ConnectionMarker};
pub use registry::{ConnectionRegistry, DiscoverReport};
pub use retargeter::Retargeter;
pub use transform::Pose;
