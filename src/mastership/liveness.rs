//! Resource Liveness
//!
//! Re-election consults a liveness oracle before promoting a standby. The
//! check is on the resource, not on the candidate node: a resource that is
//! globally unreachable is left masterless rather than handed to a new node.

use std::collections::HashSet;

use parking_lot::RwLock;

use super::types::ResourceKey;

/// Answers whether a resource is currently reachable.
pub trait LivenessOracle<R>: Send + Sync {
    fn is_available(&self, resource: &R) -> bool;
}

impl<R, F> LivenessOracle<R> for F
where
    F: Fn(&R) -> bool + Send + Sync,
{
    fn is_available(&self, resource: &R) -> bool {
        self(resource)
    }
}

/// Oracle that reports every resource as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl<R> LivenessOracle<R> for AlwaysAvailable {
    fn is_available(&self, _resource: &R) -> bool {
        true
    }
}

/// Oracle driven by an explicit set of unreachable resources.
#[derive(Debug)]
pub struct StaticLiveness<R> {
    unavailable: RwLock<HashSet<R>>,
}

impl<R: ResourceKey> Default for StaticLiveness<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ResourceKey> StaticLiveness<R> {
    pub fn new() -> Self {
        Self {
            unavailable: RwLock::new(HashSet::new()),
        }
    }

    pub fn mark_unavailable(&self, resource: R) {
        self.unavailable.write().insert(resource);
    }

    pub fn mark_available(&self, resource: &R) {
        self.unavailable.write().remove(resource);
    }
}

impl<R: ResourceKey> LivenessOracle<R> for StaticLiveness<R> {
    fn is_available(&self, resource: &R) -> bool {
        !self.unavailable.read().contains(resource)
    }
}
