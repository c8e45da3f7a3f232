//! Constraint binder: turns connections into live host constraints and back.

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{HostError, RetargetError, Result};
use crate::host::{ConstraintHost, NodeResolver};
use crate::ids::ConstraintHandle;

/// Outcome of a successful release.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub released: usize,
    /// Recoverable `ReleaseFailure`s: handles the host had already dropped.
    pub warnings: Vec<RetargetError>,
}

/// Stateless; all state lives on the connection (handles) and the host (constraints).
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstraintBinder;

impl ConstraintBinder {
    /// Create the host constraints for `conn` and hand their handles to it.
    ///
    /// All-or-nothing: if any constraint is refused, the ones already created are destroyed
    /// again and the connection stays unbound.
    pub fn realize<H>(&self, host: &mut H, conn: &mut Connection) -> Result<()>
    where
        H: NodeResolver + ConstraintHost + ?Sized,
    {
        if conn.is_bound() {
            return Ok(());
        }
        let bind_failure = |reason: String| RetargetError::BindFailure {
            driver: conn.driver().to_string(),
            driven: conn.driven().to_string(),
            reason,
        };
        let driver = host
            .resolve(conn.driver())
            .ok_or_else(|| bind_failure(format!("{} does not resolve", conn.driver())))?;
        let driven = host
            .resolve(conn.driven())
            .ok_or_else(|| bind_failure(format!("{} does not resolve", conn.driven())))?;

        let specs = conn.constraint_specs();
        let mut created: Vec<ConstraintHandle> = Vec::with_capacity(specs.len());
        for spec in &specs {
            match host.create_constraint(driver, driven, spec) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    for handle in created.into_iter().rev() {
                        if let Err(rollback) = host.destroy_constraint(handle) {
                            warn!("rollback of {handle} for {} failed: {rollback}", conn.key());
                        }
                    }
                    return Err(bind_failure(err.to_string()));
                }
            }
        }
        conn.attach_handles(created);
        Ok(())
    }

    /// Destroy every live handle of `conn`.
    ///
    /// Handles the host no longer knows are dropped with a warning. Any other host failure
    /// stops the release: the handles that could not be destroyed stay on the connection so
    /// it remains bound, and the first failure is returned.
    pub fn release<H>(&self, host: &mut H, conn: &mut Connection) -> Result<ReleaseReport>
    where
        H: ConstraintHost + ?Sized,
    {
        let mut report = ReleaseReport::default();
        let mut kept = Vec::new();
        let mut first_failure = None;

        for handle in conn.take_handles() {
            match host.destroy_constraint(handle) {
                Ok(()) => report.released += 1,
                Err(HostError::StaleHandle(_)) => {
                    warn!("{handle} of {} was already gone", conn.key());
                    report.warnings.push(RetargetError::ReleaseFailure {
                        handle,
                        reason: "constraint no longer exists".into(),
                        stale: true,
                    });
                }
                Err(err) => {
                    error!("could not release {handle} of {}: {err}", conn.key());
                    first_failure.get_or_insert(RetargetError::ReleaseFailure {
                        handle,
                        reason: err.to_string(),
                        stale: false,
                    });
                    kept.push(handle);
                }
            }
        }

        match first_failure {
            Some(err) => {
                conn.attach_handles(kept);
                Err(err)
            }
            None => Ok(report),
        }
    }
}
