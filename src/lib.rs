//! mastership - per-resource master election for a cluster of nodes
//!
//! Each resource has at most one master node, an ordered pool of standby
//! candidates and a pool of nodes that gave up on it. Coordinators on every
//! node share one [`mastership::RoleStore`] and learn about each other's
//! changes through it.

pub mod cli;
pub mod config;
pub mod mastership;
pub mod observability;
