//! The presto-admin command table.
//!
//! Every command is a `Task` whose path is the words typed on the command
//! line, e.g. `presto-admin server start`.

pub mod catalog;
pub mod collect;
pub mod configuration;
pub mod file;
pub mod package;
pub mod plugin;
pub mod server;
pub mod topology;

use std::path::Path;

use crate::error::{AdminError, Result};
use crate::executor::{Registry, Task};
use crate::host::Role;

pub const REMOTE_CONFIG_DIR: &str = "/etc/presto";
pub const REMOTE_CATALOG_DIR: &str = "/etc/presto/catalog";
pub const REMOTE_LOG_DIR: &str = "/var/log/presto";
pub const REMOTE_PLUGIN_DIR: &str = "/usr/lib/presto/lib/plugin";
pub const REMOTE_TMP_DIR: &str = "/tmp";
pub const PACKAGE_NAME: &str = "presto-server-rpm";
pub const SERVICE_NAME: &str = "presto";

/// Default roles of every remote command.
pub const ALL_ROLES: [Role; 2] = [Role::Coordinator, Role::Worker];

/// Builds the registry holding every command.
pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    for task in tasks() {
        registry.register(task)?;
    }
    Ok(registry)
}

fn tasks() -> Vec<Task> {
    vec![
        topology::show(),
        server::install(),
        server::uninstall(),
        server::upgrade(),
        server::start(),
        server::stop(),
        server::restart(),
        server::status(),
        configuration::deploy(),
        configuration::show(),
        catalog::add(),
        catalog::remove(),
        package::install(),
        package::uninstall(),
        file::copy(),
        file::run(),
        plugin::add_jar(),
        collect::logs(),
        collect::system_info(),
    ]
}

/// Final path component of a local file given on the command line.
pub(crate) fn file_name(local: &str) -> Result<String> {
    Path::new(local)
        .file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .ok_or_else(|| AdminError::config(format!("'{}' does not name a file", local)))
}

pub(crate) fn remote_join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Positional argument `index`, or `default` when it wasn't given.
pub(crate) fn arg_or<'a>(args: &'a [String], index: usize, default: &'a str) -> &'a str {
    args.get(index).map(String::as_str).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_registers() {
        let registry = registry().unwrap();
        let names: Vec<String> = registry
            .commands()
            .iter()
            .map(|task| task.name().to_string())
            .collect();
        assert_eq!(names.len(), tasks().len());
        for name in ["server start", "configuration deploy", "plugin add_jar", "collect logs"] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
        assert!(registry.resolve("server").is_none());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(file_name("/home/me/presto.rpm").unwrap(), "presto.rpm");
        assert!(file_name("/").is_err());
        assert_eq!(remote_join("/tmp/", "a.sh"), "/tmp/a.sh");
        let args = vec!["x".to_string()];
        assert_eq!(arg_or(&args, 0, "d"), "x");
        assert_eq!(arg_or(&args, 1, "d"), "d");
    }
}
