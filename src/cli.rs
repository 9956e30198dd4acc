//! From parsed command line flags to a process exit code.
//!
//! Exit codes: 0 when every host succeeded, 1 when any host failed or the
//! run aborted, 2 for usage errors (unknown command, wrong number of
//! arguments, `--hosts` outside the topology).

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use dialoguer::Password;
use tracing::{debug, info};

use crate::commands;
use crate::config::{Config, Settings};
use crate::error::{AdminError, Result};
use crate::executor::{exit_code, Executor, Registry, Targets, Task};
use crate::host::{Host, Role, RoleTable};
use crate::logging::{report_fatal, LOG_FILE_NAME};
use crate::session::{Connector, SshConnector};
use crate::topology::Topology;

/// Exit code for command line usage errors.
pub const USAGE_ERROR: i32 = 2;

/// Where this invocation logs to: `--log-file`, else the log directory.
pub fn log_file(cli: &Config) -> Result<PathBuf> {
    match &cli.log_file {
        Some(path) => Ok(path.clone()),
        None => Ok(Settings::from_config(cli, &BTreeMap::new())?
            .log_dir
            .join(LOG_FILE_NAME)),
    }
}

fn usage_error(err: impl std::fmt::Display, task: &Task) -> i32 {
    eprintln!("{}\n", err);
    eprintln!("{}", task.detailed_help());
    USAGE_ERROR
}

fn prompt_password(user: &str) -> Result<String> {
    Password::new()
        .with_prompt(format!("Sudo password for {}", user))
        .interact()
        .map_err(|e| AdminError::config(format!("Password prompt failed: {}", e)))
}

/// Runs the command named on the command line against the cluster in the
/// topology file. `connect` builds the connector once the hosts are known.
pub async fn run<F>(cli: &Config, registry: Registry, connect: F) -> Result<i32>
where
    F: FnOnce(&Settings, &[Host]) -> Arc<dyn Connector>,
{
    info!(command = %cli.command.join(" "), "presto-admin started");
    let log_file = log_file(cli)?;

    let (task, args) = match registry.resolve_command(&cli.command) {
        Some((task, args)) => (task, args.to_vec()),
        None => {
            eprintln!("Command not found:\n    {}\n", cli.command.join(" "));
            eprintln!("{}", registry.listing());
            return Ok(USAGE_ERROR);
        }
    };
    if let Err(err) = task.check_arity(args.len()) {
        return Ok(usage_error(err, &task));
    }

    let base = Settings::from_config(cli, &BTreeMap::new())?;
    let topology =
        Topology::load_or_prompt(&base.topology_path(), std::io::stdin().is_terminal())?;
    let mut settings = Settings::from_config(cli, &topology.settings_pairs())?;
    if cli.initial_password_prompt {
        settings.password = Some(prompt_password(&settings.user)?);
    }
    let roles = topology.role_table()?;

    if let Some(unknown) = unknown_host(&roles, &cli.hosts) {
        eprintln!(
            "Hosts defined in --hosts/-H must be present in {}. '{}' is not.",
            settings.topology_path().display(),
            unknown
        );
        return Ok(USAGE_ERROR);
    }
    let targets = Targets {
        hosts: (!cli.hosts.is_empty()).then(|| cli.hosts.clone()),
        roles: None,
        exclude_hosts: cli.exclude_hosts.clone(),
    };
    debug!(?targets, "Resolved targets");

    let connector = connect(&settings, roles.hosts(Role::All));
    let executor = Executor::new(settings, roles, registry, connector);
    match executor.execute(&task, args, targets).await {
        Ok(results) => Ok(exit_code(&results)),
        Err(abort) if abort.is_argument_mismatch() => Ok(usage_error(&abort, &task)),
        Err(abort) => {
            report_fatal(&abort, &log_file);
            Ok(exit_code(&abort.partial).max(1))
        }
    }
}

fn unknown_host<'a>(roles: &RoleTable, hosts: &'a [String]) -> Option<&'a String> {
    hosts.iter().find(|h| roles.find(h).is_none())
}

/// `run` with the real command table over SSH.
pub async fn run_over_ssh(cli: &Config) -> Result<i32> {
    let registry = commands::registry()?;
    run(
        cli,
        registry,
        |settings: &Settings, hosts: &[Host]| -> Arc<dyn Connector> {
            Arc::new(SshConnector::new(settings, hosts))
        },
    )
    .await
}
