//! Mastership Coordinator
//!
//! Decides, per resource, which node is master, which nodes are standby
//! candidates and which nodes have given up.
//!
//! - Every write runs inside the per-resource critical section of the store
//! - The caller's role is resolved, then the transition table picks the action
//! - Fencing and role resolution finish before the first mutation
//! - The master-map change is the last mutation of a write, so change
//!   listeners already see its term and pools
//! - Reads never fail and never lock; they may observe a write in progress
//!
//! Events returned from writes mirror what the store listener publishes on
//! the bus. The bus is fed exclusively by the listener, so local and remote
//! changes reach subscribers the same way.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::errors::{MastershipError, MastershipResult};
use super::events::{MastershipEvent, MastershipEventBus};
use super::listener::RemoteChangeListener;
use super::liveness::LivenessOracle;
use super::store::{Pool, ResourceLockGuard, RoleStore};
use super::transition::{self, Action, Operation};
use super::types::{MastershipTerm, NodeId, ResourceKey, Role, RoleInfo, Term};
use crate::config::CoordinatorConfig;
use crate::observability::{AuditOutcome, AuditRecord, MastershipObserver};

/// Result of one applied write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<R> {
    /// Action picked from the transition table
    pub action: Action,

    /// Role of the acting node afterwards
    pub role: Role,

    /// Present only when the master identity changed
    pub event: Option<MastershipEvent<R>>,

    /// Master and term afterwards
    pub term: Option<MastershipTerm>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug)]
pub struct ReconcileReport<R> {
    /// Resources a role was requested for, with the role granted
    pub requested: Vec<(R, Role)>,

    /// Resources skipped because they are unreachable
    pub unavailable: Vec<R>,

    /// Resources whose request failed
    pub failed: Vec<(R, MastershipError)>,
}

impl<R> Default for ReconcileReport<R> {
    fn default() -> Self {
        Self {
            requested: Vec::new(),
            unavailable: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Mastership policy of one cluster node.
pub struct MastershipCoordinator<R: ResourceKey> {
    local: NodeId,
    store: Arc<dyn RoleStore<R>>,
    liveness: Arc<dyn LivenessOracle<R>>,
    bus: Arc<MastershipEventBus<R>>,
    observer: MastershipObserver,
    lock_timeout: Duration,
}

impl<R: ResourceKey> MastershipCoordinator<R> {
    /// Create a coordinator for `config.node_id` and subscribe it to `store`.
    pub fn new(
        config: &CoordinatorConfig,
        store: Arc<dyn RoleStore<R>>,
        liveness: Arc<dyn LivenessOracle<R>>,
    ) -> Self {
        let bus = Arc::new(MastershipEventBus::new());
        store.subscribe(Arc::new(RemoteChangeListener::new(
            Arc::clone(&bus),
            config.notify_on_master_removal,
        )));

        Self {
            local: config.node_id.clone(),
            store,
            liveness,
            bus,
            observer: MastershipObserver::new(config.audit_capacity),
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Replace the observer (e.g. to attach an audit file).
    pub fn with_observer(mut self, observer: MastershipObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// Bus carrying every master change seen by this node.
    pub fn bus(&self) -> &Arc<MastershipEventBus<R>> {
        &self.bus
    }

    pub fn observer(&self) -> &MastershipObserver {
        &self.observer
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Role of `node` for `resource`.
    ///
    /// Unusable nodes and unknown resources report `Role::None`.
    pub fn get_role(&self, node: &NodeId, resource: &R) -> Role {
        if self.store.get_master(resource).as_ref() == Some(node) {
            Role::Master
        } else if self.store.pool_contains(Pool::Standby, resource, node) {
            Role::Standby
        } else {
            Role::None
        }
    }

    pub fn get_local_role(&self, resource: &R) -> Role {
        self.get_role(&self.local, resource)
    }

    pub fn is_local_master(&self, resource: &R) -> bool {
        self.get_local_role(resource) == Role::Master
    }

    pub fn get_master(&self, resource: &R) -> Option<NodeId> {
        self.store.get_master(resource)
    }

    /// Current master paired with its term, if the resource has a master.
    pub fn get_term_for(&self, resource: &R) -> Option<MastershipTerm> {
        let master = self.store.get_master(resource)?;
        let term = self.store.get_term(resource)?;
        Some(MastershipTerm::new(master, term))
    }

    /// Resources currently mastered by `node`.
    pub fn get_resources_mastered(&self, node: &NodeId) -> BTreeSet<R> {
        self.store
            .masters()
            .into_iter()
            .filter(|(_, master)| master == node)
            .map(|(resource, _)| resource)
            .collect()
    }

    /// Master and sorted standby candidates of `resource`.
    pub fn get_nodes(&self, resource: &R) -> RoleInfo {
        let mut standbys = self.store.pool_members(Pool::Standby, resource);
        standbys.sort();
        RoleInfo {
            master: self.store.get_master(resource),
            standbys,
        }
    }

    /// Every resource that currently has a master.
    pub fn resources(&self) -> BTreeSet<R> {
        self.store.masters().into_iter().map(|(r, _)| r).collect()
    }

    /// Reject `observed` if a newer term has been assigned since.
    pub fn validate_term(&self, resource: &R, observed: Term) -> MastershipResult<()> {
        match self.store.get_term(resource) {
            Some(current) if observed < current => {
                Err(MastershipError::stale(resource, observed, current))
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Ask for a role on behalf of the local node.
    pub fn request_role(&self, resource: &R) -> MastershipResult<Role> {
        let local = self.local.clone();
        self.execute(&local, resource, Operation::RequestRole, None)
            .map(|t| t.role)
    }

    /// Make `node` master. Returns an event only if the master changed.
    pub fn set_master(
        &self,
        node: &NodeId,
        resource: &R,
    ) -> MastershipResult<Option<MastershipEvent<R>>> {
        self.execute(node, resource, Operation::SetMaster, None)
            .map(|t| t.event)
    }

    /// Make `node` a standby, re-electing if it is the current master.
    pub fn set_standby(
        &self,
        node: &NodeId,
        resource: &R,
    ) -> MastershipResult<Option<MastershipEvent<R>>> {
        self.execute(node, resource, Operation::SetStandby, None)
            .map(|t| t.event)
    }

    /// Move `node` to the unusable pool, re-electing if it is the current master.
    pub fn relinquish_role(
        &self,
        node: &NodeId,
        resource: &R,
    ) -> MastershipResult<Option<MastershipEvent<R>>> {
        self.execute(node, resource, Operation::RelinquishRole, None)
            .map(|t| t.event)
    }

    /// Drop every assignment for `resource`.
    pub fn clear(&self, resource: &R) -> MastershipResult<()> {
        let _guard = self.enter(resource)?;
        self.store.clear(resource)?;
        info!(resource = %resource, "mastership cleared");
        Ok(())
    }

    /// Apply `op` for (`node`, `resource`) atomically.
    ///
    /// With `fence`, the write is rejected unless `fence` is at least the
    /// stored term.
    pub fn execute(
        &self,
        node: &NodeId,
        resource: &R,
        op: Operation,
        fence: Option<Term>,
    ) -> MastershipResult<Transition<R>> {
        if op == Operation::RequestRole {
            self.observer.metrics().increment_role_requests();
        }

        let result = self.execute_locked(node, resource, op, fence);
        self.observe(node, resource, op, &result);
        result
    }

    fn execute_locked(
        &self,
        node: &NodeId,
        resource: &R,
        op: Operation,
        fence: Option<Term>,
    ) -> MastershipResult<Transition<R>> {
        let _guard = self.enter(resource)?;

        if let Some(observed) = fence {
            self.validate_term(resource, observed)?;
        }

        let role = self.resolve_role(node, resource)?;
        let action = transition::plan(role, op);
        debug!(
            node = %node,
            resource = %resource,
            op = op.as_str(),
            role = role.as_str(),
            action = ?action,
            "applying mastership transition"
        );

        let (role, event) = self.apply(action, node, resource)?;

        Ok(Transition {
            action,
            role,
            event,
            term: self.get_term_for(resource),
        })
    }

    fn enter(&self, resource: &R) -> MastershipResult<ResourceLockGuard> {
        self.store.lock(resource, self.lock_timeout)
    }

    /// Role of `node` as required by writes.
    ///
    /// A master found in a pool is still master (reinforcement heals it). A
    /// non-master sitting in both pools maps to no role at all.
    fn resolve_role(&self, node: &NodeId, resource: &R) -> MastershipResult<Role> {
        let is_master = self.store.get_master(resource).as_ref() == Some(node);
        let standby = self.store.pool_contains(Pool::Standby, resource, node);
        let unusable = self.store.pool_contains(Pool::Unusable, resource, node);

        match (is_master, standby, unusable) {
            (true, _, _) => Ok(Role::Master),
            (false, true, false) => Ok(Role::Standby),
            (false, false, _) => Ok(Role::None),
            (false, true, true) => Err(MastershipError::unknown_role(
                resource,
                node,
                "node is in both standby and unusable pools",
            )),
        }
    }

    fn apply(
        &self,
        action: Action,
        node: &NodeId,
        resource: &R,
    ) -> MastershipResult<(Role, Option<MastershipEvent<R>>)> {
        match action {
            Action::Reinforce => {
                self.evict(node, resource)?;
                Ok((Role::Master, None))
            }
            Action::RemainStandby => {
                self.move_to_pool(Pool::Standby, node, resource)?;
                if self.store.get_term(resource).is_none() {
                    self.store.put_term(resource, 0)?;
                }
                Ok((Role::Standby, None))
            }
            Action::Claim => self.claim(node, resource),
            Action::Promote => {
                let event = self.promote(node, resource)?;
                Ok((Role::Master, Some(event)))
            }
            Action::ReelectThenStandby => {
                let event = self.reelect(node, resource, Pool::Standby)?;
                Ok((Role::Standby, event))
            }
            Action::JoinStandby => {
                self.move_to_pool(Pool::Standby, node, resource)?;
                Ok((Role::Standby, None))
            }
            Action::ReelectThenUnusable => {
                let event = self.reelect(node, resource, Pool::Unusable)?;
                Ok((Role::None, event))
            }
            Action::MarkUnusable => {
                self.move_to_pool(Pool::Unusable, node, resource)?;
                Ok((Role::None, None))
            }
        }
    }

    /// Take a masterless resource. If another node already holds it, queue
    /// as standby instead of displacing that node.
    fn claim(
        &self,
        node: &NodeId,
        resource: &R,
    ) -> MastershipResult<(Role, Option<MastershipEvent<R>>)> {
        if let Some(current) = self.store.get_master(resource) {
            debug!(
                node = %node,
                resource = %resource,
                master = %current,
                "resource already mastered, joining standby"
            );
            self.move_to_pool(Pool::Standby, node, resource)?;
            return Ok((Role::Standby, None));
        }

        self.store.pool_remove(Pool::Unusable, resource, node)?;
        let term = self.commit_master(resource, None, node)?;

        info!(node = %node, resource = %resource, term, "mastership claimed");
        Ok((
            Role::Master,
            Some(MastershipEvent::master_changed(resource.clone(), node.clone())),
        ))
    }

    /// Install `node`, demoting any previous master to standby.
    fn promote(&self, node: &NodeId, resource: &R) -> MastershipResult<MastershipEvent<R>> {
        let previous = self.store.get_master(resource);

        self.evict(node, resource)?;
        if let Some(previous) = previous.as_ref() {
            self.move_to_pool(Pool::Standby, previous, resource)?;
        }
        let term = self.commit_master(resource, previous.as_ref(), node)?;

        info!(
            node = %node,
            resource = %resource,
            previous = ?previous,
            term,
            "master assigned"
        );
        Ok(MastershipEvent::master_changed(resource.clone(), node.clone()))
    }

    /// Replace `current` with the first eligible standby and park `current`
    /// in `park`.
    ///
    /// Candidates are scanned in store order; the first node other than
    /// `current` wins, provided the resource itself is reachable. Without a
    /// winner the resource is left masterless and no event is returned.
    fn reelect(
        &self,
        current: &NodeId,
        resource: &R,
        park: Pool,
    ) -> MastershipResult<Option<MastershipEvent<R>>> {
        self.observer.metrics().increment_reelections();

        let candidate = if self.liveness.is_available(resource) {
            self.store
                .pool_members(Pool::Standby, resource)
                .into_iter()
                .find(|c| c != current)
        } else {
            None
        };

        self.move_to_pool(park, current, resource)?;

        let Some(candidate) = candidate else {
            self.store.remove_master(resource)?;
            self.observer.metrics().increment_failed_reelections();
            warn!(
                resource = %resource,
                previous = %current,
                "re-election found no candidate, resource left without master"
            );
            return Ok(None);
        };

        self.store.pool_remove(Pool::Standby, resource, &candidate)?;
        let term = self.commit_master(resource, Some(current), &candidate)?;

        info!(
            resource = %resource,
            previous = %current,
            master = %candidate,
            term,
            "re-election promoted standby"
        );
        Ok(Some(MastershipEvent::master_changed(
            resource.clone(),
            candidate,
        )))
    }

    /// Store the next term, then swap `expected` for `node` in the master map.
    ///
    /// The term is 0 for the first assignment, otherwise one more than the
    /// stored one. Listeners are notified by the swap and read the new term.
    fn commit_master(
        &self,
        resource: &R,
        expected: Option<&NodeId>,
        node: &NodeId,
    ) -> MastershipResult<Term> {
        let next = self
            .store
            .get_term(resource)
            .map(|t| t + 1)
            .unwrap_or(0);
        self.store.put_term(resource, next)?;

        if self.store.cas_put_master(resource, expected, node.clone())? {
            Ok(next)
        } else {
            Err(MastershipError::Store(format!(
                "master of {} changed outside its critical section",
                resource
            )))
        }
    }

    fn evict(&self, node: &NodeId, resource: &R) -> MastershipResult<()> {
        self.store.pool_remove(Pool::Standby, resource, node)?;
        self.store.pool_remove(Pool::Unusable, resource, node)?;
        Ok(())
    }

    /// Put `node` in `pool`, taking it out of the other one.
    fn move_to_pool(&self, pool: Pool, node: &NodeId, resource: &R) -> MastershipResult<()> {
        self.store.pool_remove(pool.other(), resource, node)?;
        if self.store.pool_add(pool, resource, node)? {
            match pool {
                Pool::Standby => self.observer.metrics().increment_standby_registrations(),
                Pool::Unusable => self.observer.metrics().increment_relinquishments(),
            }
        }
        Ok(())
    }

    fn observe(
        &self,
        node: &NodeId,
        resource: &R,
        op: Operation,
        result: &MastershipResult<Transition<R>>,
    ) {
        let metrics = self.observer.metrics();
        let record = match result {
            Ok(transition) => {
                let outcome = if transition.event.is_some() {
                    metrics.increment_master_changes();
                    AuditOutcome::MasterChanged
                } else {
                    AuditOutcome::Applied
                };
                AuditRecord::new(op, resource, node, outcome)
                    .with_role(transition.role)
                    .with_master(transition.term.as_ref().map(|t| &t.master))
                    .with_term(transition.term.as_ref().map(|t| t.term))
            }
            Err(err) => {
                let outcome = match err {
                    MastershipError::LockTimeout { .. } => {
                        metrics.increment_lock_timeouts();
                        warn!(
                            node = %node,
                            resource = %resource,
                            op = op.as_str(),
                            error = %err,
                            "mastership write timed out"
                        );
                        AuditOutcome::Rejected
                    }
                    MastershipError::StaleAssignment { .. } => {
                        metrics.increment_stale_rejections();
                        warn!(
                            node = %node,
                            resource = %resource,
                            op = op.as_str(),
                            error = %err,
                            "stale mastership write rejected"
                        );
                        AuditOutcome::Rejected
                    }
                    MastershipError::UnknownRole { .. } => {
                        metrics.increment_invariant_violations();
                        error!(
                            node = %node,
                            resource = %resource,
                            op = op.as_str(),
                            error = %err,
                            "mastership invariant violated"
                        );
                        AuditOutcome::Failed
                    }
                    MastershipError::Store(_) => {
                        error!(
                            node = %node,
                            resource = %resource,
                            op = op.as_str(),
                            error = %err,
                            "mastership store failure"
                        );
                        AuditOutcome::Failed
                    }
                };
                AuditRecord::new(op, resource, node, outcome).with_error(err.to_string())
            }
        };
        self.observer.record(record);
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Request a role for every reachable resource the local node has no
    /// role for.
    ///
    /// Resources the local node relinquished stay untouched until it
    /// re-registers as standby.
    pub fn reconcile<I>(&self, resources: I) -> ReconcileReport<R>
    where
        I: IntoIterator<Item = R>,
    {
        let mut report = ReconcileReport::default();

        for resource in resources {
            if !self.liveness.is_available(&resource) {
                report.unavailable.push(resource);
                continue;
            }
            if self.get_local_role(&resource) != Role::None
                || self
                    .store
                    .pool_contains(Pool::Unusable, &resource, &self.local)
            {
                continue;
            }

            match self.request_role(&resource) {
                Ok(role) => report.requested.push((resource, role)),
                Err(err) => report.failed.push((resource, err)),
            }
        }

        debug!(
            node = %self.local,
            requested = report.requested.len(),
            unavailable = report.unavailable.len(),
            failed = report.failed.len(),
            "mastership check complete"
        );
        report
    }
}
