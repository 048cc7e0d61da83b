//! CLI command implementations
//!
//! `replay` drives an in-process cluster: one coordinator per node named in
//! the input, all sharing a single role store. Each request line produces
//! exactly one response line; the final line carries the merged metrics.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::mastership::{
    AlwaysAvailable, DeviceId, InMemoryRoleStore, MastershipCoordinator, MastershipResult, NodeId,
    Operation, Term,
};
use crate::observability::{
    init_tracing, AuditLog, FileAuditLog, MastershipObserver, MetricsSnapshot,
};

use super::args::Command;
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{read_requests, write_error, write_response};

/// Operations accepted on replay input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOp {
    RequestRole,
    SetMaster,
    SetStandby,
    RelinquishRole,
    GetRole,
    GetNodes,
}

impl ReplayOp {
    /// Coordinator operation behind a write, `None` for reads.
    fn operation(&self) -> Option<Operation> {
        match self {
            Self::RequestRole => Some(Operation::RequestRole),
            Self::SetMaster => Some(Operation::SetMaster),
            Self::SetStandby => Some(Operation::SetStandby),
            Self::RelinquishRole => Some(Operation::RelinquishRole),
            Self::GetRole | Self::GetNodes => None,
        }
    }
}

/// One replay input line
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRequest {
    pub op: ReplayOp,

    /// Node issuing (or targeted by) the operation
    pub node: NodeId,

    pub resource: DeviceId,

    /// Optional fence; writes are rejected if a newer term exists
    #[serde(default)]
    pub term: Option<Term>,
}

/// Coordinators of every node seen so far, sharing one store.
pub struct ReplayCluster {
    config: CoordinatorConfig,
    store: Arc<InMemoryRoleStore<DeviceId>>,
    audit_sink: Option<Arc<dyn AuditLog>>,
    nodes: BTreeMap<NodeId, MastershipCoordinator<DeviceId>>,
}

impl ReplayCluster {
    /// Create the cluster with the configured node already present.
    pub fn new(config: CoordinatorConfig) -> CliResult<Self> {
        let audit_sink: Option<Arc<dyn AuditLog>> = match &config.audit_log_path {
            Some(path) => Some(Arc::new(FileAuditLog::open(path).map_err(|e| {
                CliError::config_error(format!(
                    "Failed to open audit log {}: {}",
                    path.display(),
                    e
                ))
            })?)),
            None => None,
        };

        let mut cluster = Self {
            store: Arc::new(InMemoryRoleStore::new()),
            audit_sink,
            nodes: BTreeMap::new(),
            config,
        };
        let local = cluster.config.node_id.clone();
        cluster.coordinator(&local);
        Ok(cluster)
    }

    fn coordinator(&mut self, node: &NodeId) -> &MastershipCoordinator<DeviceId> {
        let Self {
            config,
            store,
            audit_sink,
            nodes,
        } = self;

        nodes.entry(node.clone()).or_insert_with(|| {
            let mut node_config = config.clone();
            node_config.node_id = node.clone();

            let mut observer = MastershipObserver::new(node_config.audit_capacity);
            if let Some(sink) = audit_sink {
                observer = observer.with_sink(Arc::clone(sink));
            }

            debug!(node = %node, "replay node joined");
            MastershipCoordinator::new(&node_config, store.clone(), Arc::new(AlwaysAvailable))
                .with_observer(observer)
        })
    }

    /// Apply one request on behalf of its node.
    pub fn apply(&mut self, request: &ReplayRequest) -> MastershipResult<Value> {
        let node = request.node.clone();
        let resource = &request.resource;
        let coordinator = self.coordinator(&node);

        match request.op.operation() {
            Some(op) => {
                let transition = coordinator.execute(&node, resource, op, request.term)?;
                Ok(json!({
                    "role": transition.role,
                    "event": transition.event,
                    "term": transition.term,
                }))
            }
            None if request.op == ReplayOp::GetNodes => Ok(json!(coordinator.get_nodes(resource))),
            None => Ok(json!({
                "role": coordinator.get_role(&node, resource),
                "term": coordinator.get_term_for(resource),
            })),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Metrics summed over all nodes.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.nodes
            .values()
            .fold(MetricsSnapshot::default(), |acc, c| {
                acc.merge(&c.observer().snapshot())
            })
    }
}

/// Entry point for the CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    init_tracing(&cli.log_level, cli.json_logs);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Replay { config } => replay(&config),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Replay stdin against a fresh in-process cluster.
pub fn replay(config_path: &Path) -> CliResult<()> {
    let config = CoordinatorConfig::load(config_path)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    replay_stream(config, stdin.lock(), &mut stdout.lock())?;
    Ok(())
}

/// Replay `input` line by line, writing responses to `out`.
///
/// Malformed lines and rejected operations are answered with an error line
/// and replay continues. An I/O failure on input ends the replay.
pub fn replay_stream<R: BufRead, W: Write>(
    config: CoordinatorConfig,
    input: R,
    out: &mut W,
) -> CliResult<MetricsSnapshot> {
    let mut cluster = ReplayCluster::new(config)?;
    let mut handled = 0u64;

    for line in read_requests(input) {
        let request = line.and_then(|value| {
            serde_json::from_value::<ReplayRequest>(value).map_err(CliError::from)
        });

        match request {
            Ok(request) => match cluster.apply(&request) {
                Ok(data) => write_response(out, data)?,
                Err(e) => write_error(out, e.code(), &e.to_string())?,
            },
            Err(e) if e.code() == &CliErrorCode::IoError => {
                write_error(out, e.code_str(), e.message())?;
                return Err(e);
            }
            Err(e) => write_error(out, e.code_str(), e.message())?,
        }
        handled += 1;
    }

    let metrics = cluster.metrics();
    info!(
        requests = handled,
        nodes = cluster.node_count(),
        master_changes = metrics.master_changes,
        "replay finished"
    );
    write_response(out, json!({ "metrics": metrics }))?;
    Ok(metrics)
}

/// Validate a configuration file and print the effective settings.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = CoordinatorConfig::load(config_path)?;
    let stdout = io::stdout();
    write_response(&mut stdout.lock(), json!({ "valid": true, "config": config }))
}
