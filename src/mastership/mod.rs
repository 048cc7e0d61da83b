//! Mastership coordination
//!
//! Tracks, per resource, the single master node, the ordered standby
//! candidates and the nodes that gave up. Mastership changes flow through a
//! shared [`RoleStore`]; every node's coordinator learns about them through a
//! store listener and republishes them on its local [`MastershipEventBus`].
//!
//! # Terms
//!
//! The first assignment of a resource gets term 0. Every later master change
//! increments the term by exactly one. A resource left without master keeps
//! its last term.

mod checker;
mod coordinator;
mod errors;
mod events;
mod listener;
mod liveness;
mod store;
mod transition;
mod types;

pub use checker::{MastershipChecker, ResourceSource};
pub use coordinator::{MastershipCoordinator, ReconcileReport, Transition};
pub use errors::{MastershipError, MastershipResult};
pub use events::{
    EventReceiver, EventSender, MastershipEvent, MastershipEventBus, MastershipEventType,
};
pub use listener::RemoteChangeListener;
pub use liveness::{AlwaysAvailable, LivenessOracle, StaticLiveness};
pub use store::{
    InMemoryRoleStore, LockTable, MasterChange, MasterChangeKind, MasterChangeListener, Pool,
    ResourceLockGuard, RoleStore,
};
pub use transition::{entries, plan, Action, Operation, ROLES, TRANSITIONS};
pub use types::{DeviceId, MastershipTerm, NodeId, ResourceKey, Role, RoleInfo, Term};
