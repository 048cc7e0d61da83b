//! Metrics registry for mastership coordination
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-free

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters of one coordinator.
///
/// All counters use Relaxed ordering; exact cross-counter consistency is not
/// required.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// requestRole calls
    role_requests: AtomicU64,
    /// Transitions that changed the master identity
    master_changes: AtomicU64,
    /// Re-elections started
    reelections: AtomicU64,
    /// Re-elections that found no candidate
    failed_reelections: AtomicU64,
    /// Nodes moved into the unusable pool
    relinquishments: AtomicU64,
    /// Nodes moved into the standby pool
    standby_registrations: AtomicU64,
    /// Critical section acquisitions that timed out
    lock_timeouts: AtomicU64,
    /// Fenced writes rejected for an old term
    stale_rejections: AtomicU64,
    /// Writes refused because stored state was inconsistent
    invariant_violations: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_role_requests(&self) {
        self.role_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_master_changes(&self) {
        self.master_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reelections(&self) {
        self.reelections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_reelections(&self) {
        self.failed_reelections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_relinquishments(&self) {
        self.relinquishments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_standby_registrations(&self) {
        self.standby_registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lock_timeouts(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_rejections(&self) {
        self.stale_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invariant_violations(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            role_requests: self.role_requests.load(Ordering::Relaxed),
            master_changes: self.master_changes.load(Ordering::Relaxed),
            reelections: self.reelections.load(Ordering::Relaxed),
            failed_reelections: self.failed_reelections.load(Ordering::Relaxed),
            relinquishments: self.relinquishments.load(Ordering::Relaxed),
            standby_registrations: self.standby_registrations.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub role_requests: u64,
    pub master_changes: u64,
    pub reelections: u64,
    pub failed_reelections: u64,
    pub relinquishments: u64,
    pub standby_registrations: u64,
    pub lock_timeouts: u64,
    pub stale_rejections: u64,
    pub invariant_violations: u64,
}

impl MetricsSnapshot {
    /// Sum counters across several coordinators.
    pub fn merge(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            role_requests: self.role_requests + other.role_requests,
            master_changes: self.master_changes + other.master_changes,
            reelections: self.reelections + other.reelections,
            failed_reelections: self.failed_reelections + other.failed_reelections,
            relinquishments: self.relinquishments + other.relinquishments,
            standby_registrations: self.standby_registrations + other.standby_registrations,
            lock_timeouts: self.lock_timeouts + other.lock_timeouts,
            stale_rejections: self.stale_rejections + other.stale_rejections,
            invariant_violations: self.invariant_violations + other.invariant_violations,
        }
    }
}
