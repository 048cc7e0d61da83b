//! Mastership Audit Trail
//!
//! Every write attempt against the coordinator produces one audit record,
//! whether it changed the master, only touched a pool, or failed.
//!
//! - Records are append-only
//! - Recording never changes coordinator behavior
//! - Failures to record are logged and dropped

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::mastership::{Operation, Role, Term};

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// The master of the resource changed.
    MasterChanged,

    /// Applied without changing the master.
    Applied,

    /// Rejected before any mutation (stale term, lock timeout).
    Rejected,

    /// Failed on an invariant violation.
    Failed,
}

impl AuditOutcome {
    /// Returns the outcome string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::MasterChanged => "MASTER_CHANGED",
            AuditOutcome::Applied => "APPLIED",
            AuditOutcome::Rejected => "REJECTED",
            AuditOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Unique record ID.
    pub id: Uuid,

    /// When the operation finished.
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,
    pub resource: String,
    pub node: String,
    pub outcome: AuditOutcome,

    /// Role of `node` after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Master after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,

    /// Term after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,

    /// Error message (if outcome is Rejected or Failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Create a new audit record.
    pub fn new(
        operation: Operation,
        resource: impl fmt::Display,
        node: impl fmt::Display,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            resource: resource.to_string(),
            node: node.to_string(),
            outcome,
            role: None,
            master: None,
            term: None,
            error: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_master(mut self, master: Option<impl fmt::Display>) -> Self {
        self.master = master.map(|m| m.to_string());
        self
    }

    pub fn with_term(mut self, term: Option<Term>) -> Self {
        self.term = term;
        self
    }

    /// Set error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Serialize to one JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"id":"{}","error":"unserializable record: {}"}}"#, self.id, e)
        })
    }
}

/// Audit log trait.
pub trait AuditLog: Send + Sync {
    /// Append a record to the audit log.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

/// File-based audit log: one JSON record per line, flushed per record.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Get the audit log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", record.to_json())?;
        writer.flush()
    }
}

/// Bounded in-memory audit log. Oldest records are evicted first.
#[derive(Debug)]
pub struct MemoryAuditLog {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Get all retained records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}
