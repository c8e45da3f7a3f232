//! Retargeter: the UI-facing facade.
//!
//! Methods map one-to-one onto user actions (create connection, create IK connection,
//! delete, refresh, bake) and run each action to completion. A failed action leaves no
//! partial state behind: no half-created constraint, no orphan marker, no registry entry.

use log::{info, warn};

use crate::bake::{BakeEngine, BakeProgress, BakeRange, BakeReport, BakeState};
use crate::binder::{ConstraintBinder, ReleaseReport};
use crate::config::RetargetConfig;
use crate::connection::{Connection, ConnectionKind, CreateOptions, MarkerColor};
use crate::error::{RetargetError, Result};
use crate::host::Host;
use crate::ids::ConnectionKey;
use crate::registry::{ConnectionRegistry, DiscoverReport};
use crate::transform::{poses_approx_eq, Pose};

#[derive(Debug)]
pub struct Retargeter {
    cfg: RetargetConfig,
    registry: ConnectionRegistry,
    binder: ConstraintBinder,
    baker: BakeEngine,
}

impl Default for Retargeter {
    fn default() -> Self {
        Self::new(RetargetConfig::default())
    }
}

impl Retargeter {
    pub fn new(cfg: RetargetConfig) -> Self {
        Self {
            baker: BakeEngine::new(cfg.bake.clone()),
            registry: ConnectionRegistry::new(),
            binder: ConstraintBinder,
            cfg,
        }
    }

    pub fn config(&self) -> &RetargetConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Connections in creation order, for list views.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &Connection> + '_ {
        self.registry.list()
    }

    pub fn bake_state(&self) -> BakeState {
        self.baker.state()
    }

    /// Direct connection with the configured default options.
    pub fn connect<H>(&mut self, host: &mut H, driver: &str, driven: &str) -> Result<ConnectionKey>
    where
        H: Host + ?Sized,
    {
        let options = self.cfg.create;
        self.connect_with(host, driver, driven, ConnectionKind::Direct, &options)
    }

    /// Decomposed (IK) connection.
    pub fn connect_ik<H>(
        &mut self,
        host: &mut H,
        driver: &str,
        driven: &str,
    ) -> Result<ConnectionKey>
    where
        H: Host + ?Sized,
    {
        let options = self.cfg.create;
        self.connect_with(host, driver, driven, ConnectionKind::Decomposed, &options)
    }

    /// Create, persist and bind a connection as one unit.
    ///
    /// A pair that already has a marker in the scene is refused as a duplicate even when the
    /// registry does not know it yet.
    pub fn connect_with<H>(
        &mut self,
        host: &mut H,
        driver: &str,
        driven: &str,
        kind: ConnectionKind,
        options: &CreateOptions,
    ) -> Result<ConnectionKey>
    where
        H: Host + ?Sized,
    {
        // A marker the registry has not discovered yet belongs to someone else.
        if host
            .list_markers()?
            .iter()
            .any(|m| m.driver == driver && m.driven == driven)
        {
            warn!("{driver} -> {driven} already has a marker in the scene; refresh first");
            return Err(RetargetError::DuplicateConnection {
                driver: driver.to_string(),
                driven: driven.to_string(),
            });
        }

        // Captured so an aligned controller can be put back if a later step fails.
        let restore = match host.resolve(driven) {
            Some(node) if options.align_to_position => Some((node, host.world_transform(node)?)),
            _ => None,
        };
        let undo_align = |host: &mut H| {
            if let Some((node, pose)) = &restore {
                if let Err(err) = host.set_world_translation(*node, &pose.translation.vector) {
                    warn!("could not restore {driven} after failed connect: {err}");
                }
            }
        };

        let mut conn = match Connection::create(host, &self.registry, driver, driven, kind, options)
        {
            Ok(conn) => conn,
            Err(err) => {
                undo_align(host);
                return Err(err);
            }
        };
        let before = match host.resolve(driven).map(|node| host.world_transform(node)) {
            Some(Ok(pose)) => Some(pose),
            _ => None,
        };

        if let Err(err) = host.write_marker(&conn.to_marker()) {
            undo_align(host);
            return Err(err.into());
        }
        if let Err(err) = self.binder.realize(host, &mut conn) {
            self.drop_marker(host, conn.key());
            undo_align(host);
            return Err(err);
        }

        let key = conn.key().clone();
        if let Err(err) = self.registry.check_add(&conn) {
            if let Err(release) = self.binder.release(host, &mut conn) {
                warn!("rollback of {key} left constraints behind: {release}");
            }
            self.drop_marker(host, &key);
            undo_align(host);
            return Err(err);
        }
        self.registry.add(conn)?;

        if let Some(before) = before {
            self.check_pose_kept(host, &key, &before);
        }
        info!("connected {key} ({kind:?})");
        Ok(key)
    }

    /// Release, un-persist and forget a connection.
    pub fn disconnect<H>(
        &mut self,
        host: &mut H,
        driver: &str,
        driven: &str,
    ) -> Result<ReleaseReport>
    where
        H: Host + ?Sized,
    {
        let key = ConnectionKey::new(driver, driven);
        let conn = self
            .registry
            .get_mut(driver, driven)
            .ok_or_else(|| RetargetError::NotFound {
                what: key.to_string(),
            })?;
        let mut report = self.binder.release(host, conn)?;
        if let Err(err) = host.remove_marker(driver, driven) {
            warn!("marker of {key} not removed: {err}");
            report.warnings.push(err.into());
        }
        self.registry.remove(driver, driven);
        info!("disconnected {key}");
        Ok(report)
    }

    /// Refresh from the scene (the list view's refresh button).
    pub fn refresh<H>(&mut self, host: &H) -> Result<DiscoverReport>
    where
        H: Host + ?Sized,
    {
        self.registry.discover(host, &self.cfg.discover)
    }

    pub fn bind<H>(&mut self, host: &mut H, driver: &str, driven: &str) -> Result<()>
    where
        H: Host + ?Sized,
    {
        self.registry.bind(host, driver, driven)
    }

    pub fn unbind<H>(&mut self, host: &mut H, driver: &str, driven: &str) -> Result<ReleaseReport>
    where
        H: Host + ?Sized,
    {
        self.registry.unbind(host, driver, driven)
    }

    pub fn bake<H>(&mut self, host: &mut H, range: Option<BakeRange>) -> Result<BakeReport>
    where
        H: Host + ?Sized,
    {
        self.baker.bake(host, &mut self.registry, range)
    }

    pub fn bake_with_progress<H>(
        &mut self,
        host: &mut H,
        range: Option<BakeRange>,
        progress: &mut dyn FnMut(&BakeProgress),
    ) -> Result<BakeReport>
    where
        H: Host + ?Sized,
    {
        self.baker
            .bake_with_progress(host, &mut self.registry, range, progress)
    }

    pub fn cycle_color<H>(&mut self, host: &mut H) -> Result<MarkerColor>
    where
        H: Host + ?Sized,
    {
        self.registry.cycle_color(host)
    }

    fn drop_marker<H: Host + ?Sized>(&self, host: &mut H, key: &ConnectionKey) {
        if let Err(err) = host.remove_marker(&key.driver, &key.driven) {
            warn!("marker of {key} left behind after rollback: {err}");
        }
    }

    fn check_pose_kept<H: Host + ?Sized>(&self, host: &H, key: &ConnectionKey, before: &Pose) {
        let Some(node) = host.resolve(&key.driven) else {
            return;
        };
        match host.world_transform(node) {
            Ok(after) if !poses_approx_eq(before, &after, self.cfg.epsilon) => {
                warn!("binding {key} moved {} from {before:?} to {after:?}", key.driven);
            }
            Ok(_) => {}
            Err(err) => warn!("could not verify pose of {}: {err}", key.driven),
        }
    }
}
