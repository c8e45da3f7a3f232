//! Connection registry: insertion-ordered, keyed by endpoint pair.
//!
//! The registry is the single owner of every [`Connection`] for a rig. Discovery reconciles
//! it against the markers saved in the scene with upsert semantics, so refreshing any number
//! of times never duplicates an entry.

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::binder::{ConstraintBinder, ReleaseReport};
use crate::config::DiscoverConfig;
use crate::connection::{Connection, MarkerColor};
use crate::error::{RetargetError, Result};
use crate::host::{ConstraintHost, MarkerStore, NodeResolver};
use crate::ids::{ConnectionKey, ConstraintHandle};
use crate::marker::ConnectionMarker;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: IndexMap<ConnectionKey, Connection>,
    color: MarkerColor,
}

/// Summary of one discovery pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscoverReport {
    pub inserted: Vec<ConnectionKey>,
    pub updated: Vec<ConnectionKey>,
    pub pruned: Vec<ConnectionKey>,
    /// Bound entries kept without a marker because the host still runs their constraints.
    pub unmarked: Vec<ConnectionKey>,
    /// Markers that could not be turned into a registry entry.
    pub skipped: Vec<RetargetError>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Fails on a duplicate endpoint pair, or when `conn` is bound and
    /// its driven node already has a bound connection.
    pub fn add(&mut self, conn: Connection) -> Result<()> {
        self.check_add(&conn)?;
        self.entries.insert(conn.key().clone(), conn);
        Ok(())
    }

    /// The checks [`add`](Self::add) runs, without taking ownership.
    pub fn check_add(&self, conn: &Connection) -> Result<()> {
        if self.entries.contains_key(conn.key()) {
            return Err(RetargetError::DuplicateConnection {
                driver: conn.driver().to_string(),
                driven: conn.driven().to_string(),
            });
        }
        if conn.is_bound() {
            if let Some(bound) = self.bound_driver_of(conn.driven()) {
                return Err(RetargetError::DrivenAlreadyBound {
                    driven: conn.driven().to_string(),
                    bound_driver: bound.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Remove and return a connection, keeping the order of the remaining entries.
    /// Live handles travel with the returned connection.
    pub fn remove(&mut self, driver: &str, driven: &str) -> Option<Connection> {
        self.entries.shift_remove(&ConnectionKey::new(driver, driven))
    }

    pub fn get(&self, driver: &str, driven: &str) -> Option<&Connection> {
        self.entries.get(&ConnectionKey::new(driver, driven))
    }

    pub fn get_mut(&mut self, driver: &str, driven: &str) -> Option<&mut Connection> {
        self.entries.get_mut(&ConnectionKey::new(driver, driven))
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Connections in creation order.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &Connection> + '_ {
        self.entries.values()
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &ConnectionKey> + '_ {
        self.entries.keys()
    }

    pub fn find_by_driven<'a>(&'a self, driven: &'a str) -> impl Iterator<Item = &'a Connection> {
        self.entries.values().filter(move |c| c.driven() == driven)
    }

    /// Driver of the bound connection targeting `driven`, if any.
    pub fn bound_driver_of(&self, driven: &str) -> Option<&str> {
        self.entries
            .values()
            .find(|c| c.driven() == driven && c.is_bound())
            .map(|c| c.driver())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and hand the connections back so their handles can be released.
    pub fn clear(&mut self) -> Vec<Connection> {
        self.entries.drain(..).map(|(_, c)| c).collect()
    }

    /// Colour given to newly created connections.
    pub fn current_color(&self) -> MarkerColor {
        self.color
    }

    /// Bind a registered connection, enforcing one bound connection per driven node.
    pub fn bind<H>(&mut self, host: &mut H, driver: &str, driven: &str) -> Result<()>
    where
        H: NodeResolver + ConstraintHost + ?Sized,
    {
        let key = ConnectionKey::new(driver, driven);
        let Some(conn) = self.entries.get(&key) else {
            return Err(RetargetError::NotFound {
                what: key.to_string(),
            });
        };
        if conn.is_bound() {
            return Ok(());
        }
        if let Some(bound) = self.bound_driver_of(driven) {
            return Err(RetargetError::DrivenAlreadyBound {
                driven: driven.to_string(),
                bound_driver: bound.to_string(),
            });
        }
        match self.entries.get_mut(&key) {
            Some(conn) => conn.bind(host),
            None => Err(RetargetError::NotFound {
                what: key.to_string(),
            }),
        }
    }

    pub fn unbind<H>(&mut self, host: &mut H, driver: &str, driven: &str) -> Result<ReleaseReport>
    where
        H: ConstraintHost + ?Sized,
    {
        match self.get_mut(driver, driven) {
            Some(conn) => conn.unbind(host),
            None => Err(RetargetError::NotFound {
                what: ConnectionKey::new(driver, driven).to_string(),
            }),
        }
    }

    /// Lazily reconstruct connections from the markers saved in the scene.
    ///
    /// Each item resolves its endpoints and picks up the live constraints the host still has
    /// between them. The scan does not touch the registry and can be restarted at will.
    pub fn scan<'h, H>(host: &'h H) -> Result<Scan<'h, H>>
    where
        H: NodeResolver + ConstraintHost + MarkerStore + ?Sized,
    {
        let markers = host.list_markers()?;
        Ok(Scan {
            host,
            markers: markers.into_iter(),
        })
    }

    /// Reconcile the registry against the scene.
    ///
    /// Known pairs keep their entry and get their live-handle state and colour refreshed;
    /// new pairs are appended. With `prune_missing`, entries whose marker is gone are dropped
    /// unless the host still runs some of their constraints: those stay bound (and bakeable)
    /// and are listed in [`DiscoverReport::unmarked`].
    pub fn discover<H>(&mut self, host: &H, cfg: &DiscoverConfig) -> Result<DiscoverReport>
    where
        H: NodeResolver + ConstraintHost + MarkerStore + ?Sized,
    {
        let mut report = DiscoverReport::default();
        let mut seen: HashSet<ConnectionKey> = HashSet::new();

        for item in Self::scan(host)? {
            let found = match item {
                Ok(found) => found,
                Err(err) => {
                    warn!("skipping marker: {err}");
                    report.skipped.push(err);
                    continue;
                }
            };
            let key = found.key().clone();
            seen.insert(key.clone());

            let clash = found.is_bound().then(|| {
                self.find_by_driven(found.driven())
                    .find(|c| c.is_bound() && c.key() != &key)
                    .map(|c| c.driver().to_string())
            });
            if let Some(Some(bound_driver)) = clash {
                warn!("{key} is live but {} is already driven by {bound_driver}", key.driven);
                report.skipped.push(RetargetError::DrivenAlreadyBound {
                    driven: key.driven.clone(),
                    bound_driver,
                });
                continue;
            }

            match self.entries.get_mut(&key) {
                Some(existing) => {
                    existing.attach_handles(found.handles().to_vec());
                    existing.set_color(found.color());
                    report.updated.push(key);
                }
                None => {
                    self.entries.insert(key.clone(), found);
                    report.inserted.push(key);
                }
            }
        }

        if cfg.prune_missing {
            let stale: Vec<ConnectionKey> = self
                .entries
                .keys()
                .filter(|k| !seen.contains(*k))
                .cloned()
                .collect();
            for key in stale {
                let live = match self.entries.get(&key) {
                    Some(conn) => still_live(host, conn),
                    None => continue,
                };
                if live.is_empty() {
                    self.entries.shift_remove(&key);
                    report.pruned.push(key);
                } else if let Some(conn) = self.entries.get_mut(&key) {
                    warn!("{key} lost its marker but still drives through {live:?}");
                    conn.attach_handles(live);
                    report.unmarked.push(key);
                }
            }
        }

        if let Some(last) = self.entries.values().last() {
            self.color = last.color();
        }
        info!(
            "discover: {} inserted, {} updated, {} pruned, {} unmarked, {} skipped",
            report.inserted.len(),
            report.updated.len(),
            report.pruned.len(),
            report.unmarked.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Advance every connection to the next marker colour and rewrite the markers.
    pub fn cycle_color<H>(&mut self, host: &mut H) -> Result<MarkerColor>
    where
        H: MarkerStore + ?Sized,
    {
        let next = self.color.next();
        for conn in self.entries.values() {
            let mut marker = conn.to_marker();
            marker.color = next;
            host.write_marker(&marker)?;
        }
        for conn in self.entries.values_mut() {
            conn.set_color(next);
        }
        self.color = next;
        Ok(next)
    }
}

/// Handles of `conn` the host still reports between its endpoints.
fn still_live<H>(host: &H, conn: &Connection) -> Vec<ConstraintHandle>
where
    H: NodeResolver + ConstraintHost + ?Sized,
{
    let Some(driver) = host.resolve(conn.driver()) else {
        return Vec::new();
    };
    let Some(driven) = host.resolve(conn.driven()) else {
        return Vec::new();
    };
    let current = host.constraints_between(driver, driven);
    conn.handles()
        .iter()
        .filter(|h| current.contains(*h))
        .copied()
        .collect()
}

/// Lazy marker scan returned by [`ConnectionRegistry::scan`].
pub struct Scan<'h, H: ?Sized> {
    host: &'h H,
    markers: std::vec::IntoIter<ConnectionMarker>,
}

impl<'h, H> Iterator for Scan<'h, H>
where
    H: NodeResolver + ConstraintHost + ?Sized,
{
    type Item = Result<Connection>;

    fn next(&mut self) -> Option<Self::Item> {
        let marker = self.markers.next()?;
        let driver = match self.host.resolve(&marker.driver) {
            Some(node) => node,
            None => {
                return Some(Err(RetargetError::InvalidEndpoint {
                    id: marker.driver,
                }))
            }
        };
        let driven = match self.host.resolve(&marker.driven) {
            Some(node) => node,
            None => {
                return Some(Err(RetargetError::InvalidEndpoint {
                    id: marker.driven,
                }))
            }
        };
        let handles = self.host.constraints_between(driver, driven);
        Some(Ok(Connection::from_marker(&marker, handles)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.markers.size_hint()
    }
}
