//! Mastership Data Model
//!
//! A resource (usually a network device) is controlled by at most one master
//! node at a time. Other nodes may be registered as standby candidates, or may
//! have given up on the resource and sit in the unusable pool.
//!
//! Invariants:
//! - A node appears in at most one of {master, standby pool, unusable pool}
//! - The term for a resource increases exactly once per master change
//! - Terms never decrease

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Bound satisfied by every resource identifier the coordinator can manage.
///
/// Blanket-implemented so any opaque, hashable, ordered identifier works.
pub trait ResourceKey:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> ResourceKey for T where
    T: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a managed network device.
///
/// The default resource type; the coordinator itself is generic over
/// [`ResourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Role of a node with respect to one resource.
///
/// Nodes in the unusable pool report `None`, never `Standby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// No claim on the resource
    None,

    /// Sole node allowed to issue control commands
    Master,

    /// Candidate able to take over
    Standby,
}

impl Role {
    /// Role name for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Master => "MASTER",
            Self::Standby => "STANDBY",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource epoch counter.
pub type Term = u64;

/// A master paired with the term under which it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MastershipTerm {
    /// Node holding mastership under this term
    pub master: NodeId,

    /// Term number
    pub term: Term,
}

impl MastershipTerm {
    pub fn new(master: NodeId, term: Term) -> Self {
        Self { master, term }
    }

    /// True if `self` describes an assignment older than `other`.
    pub fn is_older_than(&self, other: &MastershipTerm) -> bool {
        self.term < other.term
    }
}

impl fmt::Display for MastershipTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.master, self.term)
    }
}

/// Master and standby candidates of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub master: Option<NodeId>,

    /// Standby candidates, sorted
    pub standbys: Vec<NodeId>,
}
