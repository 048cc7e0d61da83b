//! Mastership Observer
//!
//! Observability DESCRIBES what happened; it never DECIDES what happens.
//! The observer owns the metrics registry and the audit sinks of one
//! coordinator. A failing sink is logged and otherwise ignored.

use std::sync::Arc;

use tracing::warn;

use super::audit::{AuditLog, AuditRecord, MemoryAuditLog};
use super::metrics::{MetricsRegistry, MetricsSnapshot};

/// Collector for coordinator metrics and audit records.
pub struct MastershipObserver {
    metrics: MetricsRegistry,
    trail: Arc<MemoryAuditLog>,
    sinks: Vec<Arc<dyn AuditLog>>,
}

impl Default for MastershipObserver {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MastershipObserver {
    /// Create an observer retaining the last `audit_capacity` records in memory.
    pub fn new(audit_capacity: usize) -> Self {
        Self {
            metrics: MetricsRegistry::new(),
            trail: Arc::new(MemoryAuditLog::with_capacity(audit_capacity)),
            sinks: Vec::new(),
        }
    }

    /// Also write every record to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn AuditLog>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Retained audit records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.trail.records()
    }

    /// Record one operation outcome.
    pub fn record(&self, record: AuditRecord) {
        // The memory trail cannot fail.
        let _ = self.trail.append(&record);
        for sink in &self.sinks {
            if let Err(e) = sink.append(&record) {
                warn!(error = %e, record = %record.id, "audit sink append failed");
            }
        }
    }
}
