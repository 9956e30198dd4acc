//! presto-admin: install, configure, and operate Presto clusters over SSH.

// Serde helper module.
mod serde;
// Command line arguments and runtime settings.
pub mod config;
// How to parse and represent hosts and roles.
pub mod host;
// The cluster layout file.
pub mod topology;
// Tracing setup and user-facing reports.
pub mod logging;
// Error handling.
pub mod error;
// Remote transports over SSH.
pub mod session;
// Presto node configuration.
pub mod conf;
// Running tasks across hosts.
pub mod executor;
// The command table.
pub mod commands;
// Command line flow and exit codes.
pub mod cli;

pub use config::{Config, Settings};
pub use error::{AdminError, Result};
pub use executor::{
    exit_code, Abort, Executor, HostContext, HostResult, Registry, ResultMap, Targets, Task,
    TaskValue,
};
pub use host::{Host, Role, RoleTable};
pub use session::{Connector, Output, SshConnector, Transport};
pub use topology::Topology;
