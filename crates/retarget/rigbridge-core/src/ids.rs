//! Identifiers for host nodes, live constraints and connections.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to a node resolved by the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u32);

/// Opaque handle to a live constraint owned by the host.
///
/// Handles are only meaningful for the session that created them; they are never persisted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ConstraintHandle(pub u64);

impl fmt::Display for ConstraintHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint#{}", self.0)
    }
}

/// Identity of a connection: the (driver, driven) endpoint pair.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub driver: String,
    pub driven: String,
}

impl ConnectionKey {
    pub fn new(driver: impl Into<String>, driven: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            driven: driven.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.driver, self.driven)
    }
}

/// Monotonic allocator for node and constraint handles.
/// Hosts that keep their own identity scheme do not need it.
#[derive(Default, Debug)]
pub struct HandleAllocator {
    next_node: u32,
    next_constraint: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_node(&mut self) -> NodeHandle {
        let id = NodeHandle(self.next_node);
        self.next_node = self.next_node.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_constraint(&mut self) -> ConstraintHandle {
        let id = ConstraintHandle(self.next_constraint);
        self.next_constraint = self.next_constraint.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
