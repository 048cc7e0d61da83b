//! Replicated Role Store
//!
//! The coordinator keeps all mastership state in a store it does not own:
//! - master map (resource → node)
//! - term map (resource → term)
//! - standby and unusable pools (resource → nodes)
//! - a mutual-exclusion lock per resource
//! - change notifications on the master map
//!
//! [`RoleStore`] is that contract. [`InMemoryRoleStore`] implements it for a
//! single process; several coordinators sharing one `Arc<InMemoryRoleStore>`
//! behave like cluster nodes sharing a replicated map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use super::errors::{MastershipError, MastershipResult};
use super::types::{NodeId, ResourceKey, Term};

/// Per-resource node pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    /// Candidates able to take over
    Standby,

    /// Nodes that gave up or were evicted
    Unusable,
}

impl Pool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Unusable => "unusable",
        }
    }

    /// The pool a node must leave when it enters `self`.
    pub fn other(&self) -> Pool {
        match self {
            Self::Standby => Self::Unusable,
            Self::Unusable => Self::Standby,
        }
    }
}

/// Shape of a master-map mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterChangeKind {
    /// A master appeared where none existed
    Added,

    /// A different master replaced the previous one
    Replaced,

    /// The master entry was removed
    Removed,

    /// Same value written again
    Unchanged,
}

/// A master-map mutation as delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterChange<R> {
    pub resource: R,
    pub old: Option<NodeId>,
    pub new: Option<NodeId>,
}

impl<R> MasterChange<R> {
    pub fn kind(&self) -> MasterChangeKind {
        match (&self.old, &self.new) {
            (None, Some(_)) => MasterChangeKind::Added,
            (Some(old), Some(new)) if old != new => MasterChangeKind::Replaced,
            (Some(_), None) => MasterChangeKind::Removed,
            _ => MasterChangeKind::Unchanged,
        }
    }
}

/// Receives master-map mutations from any node, including the local one.
pub trait MasterChangeListener<R>: Send + Sync {
    fn on_master_change(&self, change: &MasterChange<R>);
}

/// Contract of the replicated mastership store.
///
/// Every mutation is atomic on its own. Multi-step transitions are made atomic
/// by holding the guard returned from [`RoleStore::lock`].
///
/// Writers do not roll back earlier steps of a transition. While the lock is
/// held, mutations may fail only when the store itself is lost. The master
/// map change via [`RoleStore::cas_put_master`] or [`RoleStore::remove_master`]
/// is always the last step and commits the transition: a failure before it
/// leaves the master, and every listener's view, unchanged.
pub trait RoleStore<R: ResourceKey>: Send + Sync {
    /// Current master of `resource`.
    fn get_master(&self, resource: &R) -> Option<NodeId>;

    /// Install `node` as master if the current value equals `expected`.
    ///
    /// Returns false (and changes nothing) when the comparison fails.
    fn cas_put_master(
        &self,
        resource: &R,
        expected: Option<&NodeId>,
        node: NodeId,
    ) -> MastershipResult<bool>;

    /// Remove the master entry, returning the previous master.
    fn remove_master(&self, resource: &R) -> MastershipResult<Option<NodeId>>;

    /// Current term of `resource`.
    fn get_term(&self, resource: &R) -> Option<Term>;

    /// Store a new term. Terms never decrease.
    fn put_term(&self, resource: &R, term: Term) -> MastershipResult<()>;

    /// Add `node` to a pool. Returns false if it was already there.
    fn pool_add(&self, pool: Pool, resource: &R, node: &NodeId) -> MastershipResult<bool>;

    /// Remove `node` from a pool. Returns false if it was absent.
    fn pool_remove(&self, pool: Pool, resource: &R, node: &NodeId) -> MastershipResult<bool>;

    fn pool_contains(&self, pool: Pool, resource: &R, node: &NodeId) -> bool;

    /// Pool members in store iteration order.
    fn pool_members(&self, pool: Pool, resource: &R) -> Vec<NodeId>;

    /// Every (resource, master) entry.
    fn masters(&self) -> Vec<(R, NodeId)>;

    /// Drop master, term and pools of `resource`.
    fn clear(&self, resource: &R) -> MastershipResult<()>;

    /// Enter the critical section for `resource`, waiting at most `timeout`.
    fn lock(&self, resource: &R, timeout: Duration) -> MastershipResult<ResourceLockGuard>;

    /// Register a master-map change listener.
    fn subscribe(&self, listener: Arc<dyn MasterChangeListener<R>>);
}

// =============================================================================
// Lock table
// =============================================================================

#[derive(Debug, Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

type SlotMap<R> = Arc<Mutex<HashMap<R, Arc<LockSlot>>>>;

/// Drop the slot of `resource` if no guard or waiter references it.
///
/// Every holder and waiter owns a clone of the slot, and clones are only
/// handed out under the map lock, so a count of one means idle.
fn prune_idle<R: ResourceKey>(slots: &SlotMap<R>, resource: &R) {
    let mut slots = slots.lock();
    if slots
        .get(resource)
        .map(|slot| Arc::strong_count(slot) == 1)
        .unwrap_or(false)
    {
        slots.remove(resource);
    }
}

/// Lazily populated table of per-resource locks.
///
/// Resources are independent, so operations on different resources never
/// contend. Locks are not reentrant. A slot lives only while someone holds
/// or waits for it.
#[derive(Debug)]
pub struct LockTable<R> {
    slots: SlotMap<R>,
}

impl<R: ResourceKey> Default for LockTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ResourceKey> LockTable<R> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire the lock for `resource`, waiting at most `timeout`.
    pub fn acquire(&self, resource: &R, timeout: Duration) -> MastershipResult<ResourceLockGuard> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(resource.clone()).or_default())
        };

        let started = Instant::now();
        let deadline = started + timeout;
        let acquired = {
            let mut held = slot.held.lock();
            loop {
                if !*held {
                    *held = true;
                    break true;
                }
                if slot.released.wait_until(&mut held, deadline).timed_out() && *held {
                    break false;
                }
            }
        };

        if !acquired {
            drop(slot);
            prune_idle(&self.slots, resource);
            return Err(MastershipError::lock_timeout(
                resource,
                started.elapsed().as_millis() as u64,
            ));
        }

        let slots = Arc::clone(&self.slots);
        let key = resource.clone();
        Ok(ResourceLockGuard {
            slot: Some(slot),
            prune: Some(Box::new(move || prune_idle(&slots, &key))),
        })
    }

    /// Number of resources currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped handle on a per-resource critical section. Released on drop.
pub struct ResourceLockGuard {
    slot: Option<Arc<LockSlot>>,
    prune: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for ResourceLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLockGuard").finish_non_exhaustive()
    }
}

impl Drop for ResourceLockGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            *slot.held.lock() = false;
            slot.released.notify_one();
        }
        if let Some(prune) = self.prune.take() {
            prune();
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug)]
struct StoreState<R> {
    masters: HashMap<R, NodeId>,
    terms: HashMap<R, Term>,
    standby: HashMap<R, Vec<NodeId>>,
    unusable: HashMap<R, Vec<NodeId>>,
}

impl<R: ResourceKey> StoreState<R> {
    fn new() -> Self {
        Self {
            masters: HashMap::new(),
            terms: HashMap::new(),
            standby: HashMap::new(),
            unusable: HashMap::new(),
        }
    }

    fn pool(&self, pool: Pool) -> &HashMap<R, Vec<NodeId>> {
        match pool {
            Pool::Standby => &self.standby,
            Pool::Unusable => &self.unusable,
        }
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut HashMap<R, Vec<NodeId>> {
        match pool {
            Pool::Standby => &mut self.standby,
            Pool::Unusable => &mut self.unusable,
        }
    }
}

/// Process-local [`RoleStore`].
///
/// Pools keep insertion order, so re-election considers the longest-waiting
/// standby first.
pub struct InMemoryRoleStore<R> {
    state: RwLock<StoreState<R>>,
    locks: LockTable<R>,
    listeners: RwLock<Vec<Arc<dyn MasterChangeListener<R>>>>,
}

impl<R: ResourceKey> Default for InMemoryRoleStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ResourceKey> InMemoryRoleStore<R> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::new()),
            locks: LockTable::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Number of per-resource lock slots in use.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Number of registered change listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self, change: MasterChange<R>) {
        if change.kind() == MasterChangeKind::Unchanged {
            return;
        }
        // Snapshot so listeners run without holding the registry lock.
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.on_master_change(&change);
        }
    }
}

impl<R: ResourceKey> RoleStore<R> for InMemoryRoleStore<R> {
    fn get_master(&self, resource: &R) -> Option<NodeId> {
        self.state.read().masters.get(resource).cloned()
    }

    fn cas_put_master(
        &self,
        resource: &R,
        expected: Option<&NodeId>,
        node: NodeId,
    ) -> MastershipResult<bool> {
        let old = {
            let mut state = self.state.write();
            let current = state.masters.get(resource);
            if current != expected {
                return Ok(false);
            }
            state.masters.insert(resource.clone(), node.clone())
        };

        self.notify(MasterChange {
            resource: resource.clone(),
            old,
            new: Some(node),
        });
        Ok(true)
    }

    fn remove_master(&self, resource: &R) -> MastershipResult<Option<NodeId>> {
        let old = self.state.write().masters.remove(resource);
        if old.is_some() {
            self.notify(MasterChange {
                resource: resource.clone(),
                old: old.clone(),
                new: None,
            });
        }
        Ok(old)
    }

    fn get_term(&self, resource: &R) -> Option<Term> {
        self.state.read().terms.get(resource).copied()
    }

    fn put_term(&self, resource: &R, term: Term) -> MastershipResult<()> {
        let mut state = self.state.write();
        if let Some(current) = state.terms.get(resource) {
            if term < *current {
                return Err(MastershipError::Store(format!(
                    "term for {} would decrease from {} to {}",
                    resource, current, term
                )));
            }
        }
        state.terms.insert(resource.clone(), term);
        Ok(())
    }

    fn pool_add(&self, pool: Pool, resource: &R, node: &NodeId) -> MastershipResult<bool> {
        let mut state = self.state.write();
        let members = state.pool_mut(pool).entry(resource.clone()).or_default();
        if members.contains(node) {
            return Ok(false);
        }
        members.push(node.clone());
        Ok(true)
    }

    fn pool_remove(&self, pool: Pool, resource: &R, node: &NodeId) -> MastershipResult<bool> {
        let mut state = self.state.write();
        let members = match state.pool_mut(pool).get_mut(resource) {
            Some(members) => members,
            None => return Ok(false),
        };
        let before = members.len();
        members.retain(|n| n != node);
        let removed = members.len() != before;
        if members.is_empty() {
            state.pool_mut(pool).remove(resource);
        }
        Ok(removed)
    }

    fn pool_contains(&self, pool: Pool, resource: &R, node: &NodeId) -> bool {
        self.state
            .read()
            .pool(pool)
            .get(resource)
            .map(|members| members.contains(node))
            .unwrap_or(false)
    }

    fn pool_members(&self, pool: Pool, resource: &R) -> Vec<NodeId> {
        self.state
            .read()
            .pool(pool)
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    fn masters(&self) -> Vec<(R, NodeId)> {
        self.state
            .read()
            .masters
            .iter()
            .map(|(r, n)| (r.clone(), n.clone()))
            .collect()
    }

    fn clear(&self, resource: &R) -> MastershipResult<()> {
        let old = {
            let mut state = self.state.write();
            state.terms.remove(resource);
            state.standby.remove(resource);
            state.unusable.remove(resource);
            state.masters.remove(resource)
        };
        if old.is_some() {
            self.notify(MasterChange {
                resource: resource.clone(),
                old,
                new: None,
            });
        }
        Ok(())
    }

    fn lock(&self, resource: &R, timeout: Duration) -> MastershipResult<ResourceLockGuard> {
        self.locks.acquire(resource, timeout)
    }

    fn subscribe(&self, listener: Arc<dyn MasterChangeListener<R>>) {
        self.listeners.write().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastership::types::DeviceId;
    use std::thread;

    fn dev(id: &str) -> DeviceId {
        DeviceId::from(id)
    }

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MasterChange<DeviceId>>>,
    }

    impl MasterChangeListener<DeviceId> for Recorder {
        fn on_master_change(&self, change: &MasterChange<DeviceId>) {
            self.seen.lock().push(change.clone());
        }
    }

    #[test]
    fn test_cas_put_respects_expected_value() {
        let store = InMemoryRoleStore::new();
        assert!(store.cas_put_master(&dev("d1"), None, node("a")).unwrap());
        assert!(!store.cas_put_master(&dev("d1"), None, node("b")).unwrap());
        assert!(store
            .cas_put_master(&dev("d1"), Some(&node("a")), node("b"))
            .unwrap());
        assert_eq!(store.get_master(&dev("d1")), Some(node("b")));
    }

    #[test]
    fn test_term_never_decreases() {
        let store = InMemoryRoleStore::new();
        store.put_term(&dev("d1"), 3).unwrap();
        store.put_term(&dev("d1"), 3).unwrap();
        assert!(store.put_term(&dev("d1"), 2).is_err());
        assert_eq!(store.get_term(&dev("d1")), Some(3));
    }

    #[test]
    fn test_pools_keep_insertion_order_without_duplicates() {
        let store = InMemoryRoleStore::new();
        let d = dev("d1");
        assert!(store.pool_add(Pool::Standby, &d, &node("c")).unwrap());
        assert!(store.pool_add(Pool::Standby, &d, &node("a")).unwrap());
        assert!(!store.pool_add(Pool::Standby, &d, &node("c")).unwrap());
        assert_eq!(store.pool_members(Pool::Standby, &d), vec![node("c"), node("a")]);

        assert!(store.pool_remove(Pool::Standby, &d, &node("c")).unwrap());
        assert!(!store.pool_remove(Pool::Standby, &d, &node("c")).unwrap());
        assert!(!store.pool_contains(Pool::Standby, &d, &node("c")));
        assert!(store.pool_members(Pool::Unusable, &d).is_empty());
    }

    #[test]
    fn test_listeners_see_add_replace_remove() {
        let store = InMemoryRoleStore::new();
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        let d = dev("d1");
        store.cas_put_master(&d, None, node("a")).unwrap();
        store.cas_put_master(&d, Some(&node("a")), node("a")).unwrap();
        store.cas_put_master(&d, Some(&node("a")), node("b")).unwrap();
        store.remove_master(&d).unwrap();
        store.remove_master(&d).unwrap();

        let kinds: Vec<_> = recorder.seen.lock().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MasterChangeKind::Added,
                MasterChangeKind::Replaced,
                MasterChangeKind::Removed
            ]
        );
    }

    #[test]
    fn test_clear_drops_everything() {
        let store = InMemoryRoleStore::new();
        let d = dev("d1");
        store.cas_put_master(&d, None, node("a")).unwrap();
        store.put_term(&d, 4).unwrap();
        store.pool_add(Pool::Standby, &d, &node("b")).unwrap();
        store.pool_add(Pool::Unusable, &d, &node("c")).unwrap();

        store.clear(&d).unwrap();

        assert_eq!(store.get_master(&d), None);
        assert_eq!(store.get_term(&d), None);
        assert!(store.pool_members(Pool::Standby, &d).is_empty());
        assert!(store.pool_members(Pool::Unusable, &d).is_empty());
    }

    #[test]
    fn test_lock_times_out_while_held() {
        let store: InMemoryRoleStore<DeviceId> = InMemoryRoleStore::new();
        let _guard = store.lock(&dev("d1"), Duration::from_millis(50)).unwrap();

        let err = store
            .lock(&dev("d1"), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, MastershipError::LockTimeout { .. }));

        // Other resources are independent.
        assert!(store.lock(&dev("d2"), Duration::from_millis(20)).is_ok());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let store: InMemoryRoleStore<DeviceId> = InMemoryRoleStore::new();
        {
            let _guard = store.lock(&dev("d1"), Duration::from_millis(50)).unwrap();
        }
        assert!(store.lock(&dev("d1"), Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn test_lock_hands_over_between_threads() {
        let table: Arc<LockTable<DeviceId>> = Arc::new(LockTable::new());
        let guard = table.acquire(&dev("d1"), Duration::from_secs(1)).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.acquire(&dev("d1"), Duration::from_secs(5)).is_ok())
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().unwrap());
        assert!(table.is_empty());
    }

    #[test]
    fn test_lock_slots_pruned_after_release() {
        let table: LockTable<DeviceId> = LockTable::new();
        for i in 0..16 {
            let _guard = table
                .acquire(&dev(&format!("d{}", i)), Duration::from_millis(50))
                .unwrap();
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_lock_slot_survives_while_waiter_times_out() {
        let table: LockTable<DeviceId> = LockTable::new();
        let guard = table.acquire(&dev("d1"), Duration::from_millis(50)).unwrap();

        assert!(table.acquire(&dev("d1"), Duration::from_millis(10)).is_err());
        // Holder still owns the slot; it must not be replaced.
        assert_eq!(table.len(), 1);
        assert!(table.acquire(&dev("d1"), Duration::from_millis(10)).is_err());

        drop(guard);
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_under_lock_leaves_no_slot() {
        let store = InMemoryRoleStore::new();
        let d = dev("d1");
        {
            let _guard = store.lock(&d, Duration::from_millis(50)).unwrap();
            store.cas_put_master(&d, None, node("a")).unwrap();
            store.clear(&d).unwrap();
        }
        assert_eq!(store.lock_count(), 0);
    }
}
