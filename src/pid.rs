// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Process identifiers
//!
//! The `pid` module provides the [`Pid`] type, the logical handle that
//! addresses a process in the runtime. A `Pid` carries the system
//! address it belongs to and a hierarchical id whose `/`-separated
//! segments mirror the supervision tree (`root/child/grandchild`).
//!
//! A `Pid` is a pure value: it never holds a reference to the process it
//! names, it is freely copyable, and equality covers both fields. The
//! registry resolves a `Pid` to a live process on every send, so holding
//! a `Pid` to a stopped actor is always safe; messages simply route to
//! the dead-letter sink.
//!

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::Div;
use std::str::FromStr;

/// Logical handle for a process.
///
/// The `address` field names the actor system the process lives on; the
/// `id` field locates the process inside that system. The remote layer
/// serializes a pid as `"{address}/{id}"`.
///
/// # Thread Safety
///
/// `Pid` is a plain value and is `Send + Sync`. All operations are
/// immutable and return new instances, so pids can be copied into
/// messages, closures and other systems freely.
///
/// # Examples
///
/// ```ignore
/// use troupe::Pid;
///
/// let worker = Pid::new("local", "root/manager/worker");
/// assert_eq!(worker.name(), "worker");
/// assert_eq!(worker.parent().unwrap().id(), "root/manager");
/// assert_eq!(worker.to_string(), "local/root/manager/worker");
/// ```
#[derive(
    Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Pid {
    address: String,
    id: String,
}

impl Pid {
    /// Creates a pid from a system address and a hierarchical id.
    ///
    /// # Arguments
    ///
    /// * `address` - The system address the process lives on.
    /// * `id` - The hierarchical id inside that system.
    ///
    /// # Returns
    ///
    /// A new pid value. No validation happens here: a pid naming a
    /// process that does not exist resolves to dead letters on use.
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }

    /// The system address this pid belongs to.
    ///
    /// # Returns
    ///
    /// The address string. The registry compares it against its own
    /// address to choose between local and remote resolution.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The hierarchical id inside the owning system.
    ///
    /// # Returns
    ///
    /// The full `/`-separated id, e.g. `root/manager/worker`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The last id segment, which is the name the process was spawned
    /// under.
    ///
    /// # Returns
    ///
    /// The final segment of the id. For a single-segment id the whole
    /// id is returned.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let pid = Pid::new("local", "root/manager/worker");
    /// assert_eq!(pid.name(), "worker");
    /// assert_eq!(Pid::new("local", "root").name(), "root");
    /// ```
    pub fn name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    /// The pid of the parent, if this id has one.
    ///
    /// # Returns
    ///
    /// `Some` pid with the last segment removed, or `None` for a
    /// top-level id such as a guardian's.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let pid = Pid::new("local", "root/manager/worker");
    /// assert_eq!(pid.parent().unwrap().id(), "root/manager");
    /// assert!(Pid::new("local", "root").parent().is_none());
    /// ```
    pub fn parent(&self) -> Option<Pid> {
        self.id
            .rsplit_once('/')
            .map(|(parent, _)| Pid::new(&self.address, parent))
    }

    /// Builds a child pid under this one.
    ///
    /// # Arguments
    ///
    /// * `name` - The child's name segment.
    ///
    /// # Returns
    ///
    /// A pid on the same system address whose id is this id extended
    /// with `/{name}`. The `/` operator does the same:
    ///
    /// ```ignore
    /// let manager = Pid::new("local", "root/manager");
    /// let worker = manager.clone() / "worker";
    /// assert_eq!(worker, manager.child("worker"));
    /// ```
    pub fn child(&self, name: &str) -> Pid {
        Pid::new(&self.address, format!("{}/{}", self.id, name))
    }

    /// True if `self` is a direct child of `other`.
    ///
    /// # Arguments
    ///
    /// * `other` - The candidate parent.
    ///
    /// # Returns
    ///
    /// `true` only for an exact one-level relationship on the same
    /// system address; grandchildren and foreign addresses answer
    /// `false`.
    pub fn is_child_of(&self, other: &Pid) -> bool {
        self.address == other.address
            && self
                .id
                .rsplit_once('/')
                .is_some_and(|(parent, _)| parent == other.id)
    }

    /// True if `self` sits anywhere below `other` in the tree.
    ///
    /// # Arguments
    ///
    /// * `other` - The candidate ancestor.
    ///
    /// # Returns
    ///
    /// `true` for children, grandchildren and deeper descendants on the
    /// same system address. A pid is not a descendant of itself, and a
    /// shared id prefix without a `/` boundary does not count.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let root = Pid::new("local", "root");
    /// assert!(Pid::new("local", "root/a/b").is_descendant_of(&root));
    /// assert!(!Pid::new("local", "rooted").is_descendant_of(&root));
    /// ```
    pub fn is_descendant_of(&self, other: &Pid) -> bool {
        self.address == other.address
            && self.id.len() > other.id.len()
            && self.id.starts_with(&other.id)
            && self.id.as_bytes()[other.id.len()] == b'/'
    }
}

/// `pid / "name"` builds a child pid, mirroring id hierarchy syntax.
impl Div<&str> for Pid {
    type Output = Pid;

    fn div(self, name: &str) -> Pid {
        self.child(name)
    }
}

/// Formats the wire representation `"{address}/{id}"`, the format the
/// remote layer puts on the wire.
impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}

/// Parses the wire format `"{address}/{id}"`. The address is everything
/// before the first `/`.
///
/// # Errors
///
/// Returns [`crate::Error::Send`] when the input has no separator or
/// either side of it is empty; a round trip through `Display` always
/// parses back.
///
/// # Examples
///
/// ```ignore
/// let pid: Pid = "local/root/worker".parse()?;
/// assert_eq!(pid.address(), "local");
/// assert_eq!(pid.id(), "root/worker");
/// ```
impl FromStr for Pid {
    type Err = crate::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('/') {
            Some((address, id)) if !address.is_empty() && !id.is_empty() => {
                Ok(Pid::new(address, id))
            }
            _ => Err(crate::Error::Send(format!(
                "malformed pid '{}'",
                value
            ))),
        }
    }
}
