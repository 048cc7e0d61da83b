//! Observability subsystem
//!
//! This module provides:
//! - Structured logging through `tracing`
//! - Coordinator metrics (counters)
//! - An append-only audit trail of mastership operations
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on coordination
//! 3. Sink failures are never fatal

mod audit;
mod metrics;
mod observer;

pub use audit::{AuditLog, AuditOutcome, AuditRecord, FileAuditLog, MemoryAuditLog};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use observer::MastershipObserver;

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to `default_filter`. Logs go to stderr so
/// stdout stays reserved for command output. Calling it twice is harmless.
pub fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
