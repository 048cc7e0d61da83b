//! CLI module for the mastership coordinator
//!
//! Provides command-line interface for:
//! - replay: Apply JSON-lines operations to an in-process cluster
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check_config, replay, replay_stream, run, run_command, ReplayCluster, ReplayOp, ReplayRequest,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_requests, write_error, write_response};
