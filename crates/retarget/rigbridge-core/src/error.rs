//! Error types for the retargeting core.

use serde::{Deserialize, Serialize};

use crate::ids::ConstraintHandle;

pub type Result<T> = std::result::Result<T, RetargetError>;

/// Failures surfaced to the user by core operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RetargetError {
    /// A connection endpoint does not resolve to a node (or both endpoints are the same node)
    #[error("Invalid endpoint: {id}")]
    InvalidEndpoint { id: String },

    /// The (driver, driven) pair is already connected
    #[error("Connection already exists: {driver} -> {driven}")]
    DuplicateConnection { driver: String, driven: String },

    /// The driven controller is already the target of a bound connection
    #[error("Controller {driven} is already driven by {bound_driver}")]
    DrivenAlreadyBound { driven: String, bound_driver: String },

    /// A direct connection was requested with neither translation nor rotation
    #[error("No channels selected for {driver} -> {driven}")]
    InvalidChannels { driver: String, driven: String },

    /// The host refused to create a constraint
    #[error("Bind failure for {driver} -> {driven}: {reason}")]
    BindFailure {
        driver: String,
        driven: String,
        reason: String,
    },

    /// The host could not destroy a constraint. `stale` marks handles the host no longer knows.
    #[error("Release failure for {handle}: {reason}")]
    ReleaseFailure {
        handle: ConstraintHandle,
        reason: String,
        stale: bool,
    },

    /// Bake range with start after end
    #[error("Invalid bake range [{start}, {end}]")]
    InvalidRange { start: i64, end: i64 },

    /// Lookup of a connection or node failed
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Batch job rejected before running
    #[error("Invalid batch job: {reason}")]
    InvalidBatch { reason: String },

    /// Any other host collaborator failure
    #[error("Host error: {reason}")]
    Host { reason: String },

    /// Marker or config (de)serialization error
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl RetargetError {
    /// Recoverable errors are reported as warnings; the desired end state was still reached.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReleaseFailure { stale: true, .. })
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. }
            | Self::DuplicateConnection { .. }
            | Self::DrivenAlreadyBound { .. }
            | Self::InvalidChannels { .. } => "connection",
            Self::BindFailure { .. } | Self::ReleaseFailure { .. } => "constraint",
            Self::InvalidRange { .. } => "bake",
            Self::NotFound { .. } => "lookup",
            Self::InvalidBatch { .. } => "batch",
            Self::Host { .. } => "host",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for RetargetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<HostError> for RetargetError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NodeNotFound(what) => Self::NotFound { what },
            other => Self::Host {
                reason: other.to_string(),
            },
        }
    }
}

/// Failures reported by host collaborators.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("{0} does not exist")]
    StaleHandle(ConstraintHandle),

    #[error("{node} has locked {channel} channels")]
    Locked { node: String, channel: &'static str },

    #[error("{driver} is parented under {driven}")]
    Cycle { driver: String, driven: String },

    #[error("{0} is not keyable")]
    NotKeyable(String),

    #[error("{0}")]
    Rejected(String),
}
