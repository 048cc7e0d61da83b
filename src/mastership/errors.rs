//! Mastership Error Types
//!
//! Read operations never fail: absence of an assignment is the legitimate
//! `Role::None` state. Write operations either complete a transition or fail
//! with no partial mutation.

use thiserror::Error;

use super::types::Term;

/// Result type for mastership operations
pub type MastershipResult<T> = Result<T, MastershipError>;

/// Mastership errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MastershipError {
    /// Caller acted on an assignment that has since been replaced
    #[error("Stale assignment for {resource}: observed term {observed}, current term {current}")]
    StaleAssignment {
        resource: String,
        observed: Term,
        current: Term,
    },

    /// Per-resource critical section could not be entered in time
    #[error("Timed out after {waited_ms}ms waiting for lock on {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },

    /// Stored state maps to no single role (invariant violation)
    #[error("Unknown role for node {node} on {resource}: {detail}")]
    UnknownRole {
        resource: String,
        node: String,
        detail: String,
    },

    /// Backing store rejected a mutation
    #[error("Store error: {0}")]
    Store(String),
}

impl MastershipError {
    pub fn stale(resource: impl ToString, observed: Term, current: Term) -> Self {
        Self::StaleAssignment {
            resource: resource.to_string(),
            observed,
            current,
        }
    }

    pub fn lock_timeout(resource: impl ToString, waited_ms: u64) -> Self {
        Self::LockTimeout {
            resource: resource.to_string(),
            waited_ms,
        }
    }

    pub fn unknown_role(
        resource: impl ToString,
        node: impl ToString,
        detail: impl Into<String>,
    ) -> Self {
        Self::UnknownRole {
            resource: resource.to_string(),
            node: node.to_string(),
            detail: detail.into(),
        }
    }

    /// Whether the caller may simply retry (after refreshing its view).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleAssignment { .. } | Self::LockTimeout { .. }
        )
    }

    /// Stable error code for CLI and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StaleAssignment { .. } => "MASTERSHIP_STALE_ASSIGNMENT",
            Self::LockTimeout { .. } => "MASTERSHIP_LOCK_TIMEOUT",
            Self::UnknownRole { .. } => "MASTERSHIP_UNKNOWN_ROLE",
            Self::Store(_) => "MASTERSHIP_STORE_ERROR",
        }
    }
}
