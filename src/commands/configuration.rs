//! Deploying and inspecting node configuration.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::commands::{remote_join, ALL_ROLES, REMOTE_CONFIG_DIR};
use crate::conf::{
    desired_config, ConfigStore, NodeIdSource, Properties, Renderer, CONFIG_PROPERTIES,
    JVM_CONFIG, LOG_PROPERTIES, NODE_PROPERTIES,
};
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::host::Role;

pub fn deploy() -> Task {
    Task::new("configuration deploy", deploy_configuration)
        .optional_arg("coordinator|workers")
        .summary("Deploy the Presto configuration to the cluster")
        .help(
            "Builds each node's configuration from the role defaults and the files \
             under <config-dir>/coordinator and <config-dir>/workers, then uploads \
             it to /etc/presto. A node keeps its node.id across deploys. \
             Give 'coordinator' or 'workers' to deploy to that role only.",
        )
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn show() -> Task {
    Task::new("configuration show", show_configuration)
        .optional_arg("node|jvm|config|log")
        .summary("Show the configuration deployed on each host")
        .roles(&ALL_ROLES)
}

async fn deploy_configuration(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    if let Some(role) = args.first() {
        let role: Role = role.parse()?;
        if role == Role::All {
            return Err(AdminError::config("Expected 'coordinator' or 'workers'"));
        }
        if !cx.has_role(role) {
            debug!(host = %cx.host_key(), role = %role, "Not in role, skipping deploy");
            return Ok(TaskValue::None);
        }
    }
    deploy_node_config(&cx).await?;
    Ok(TaskValue::None)
}

/// Converges the host's `/etc/presto` on the desired configuration.
/// Running it twice leaves the host exactly as after the first run.
pub async fn deploy_node_config(cx: &HostContext) -> Result<()> {
    let host = cx.host()?;
    let store = ConfigStore::new(&cx.settings().config_dir);
    let mut config = desired_config(&store, cx.roles(), host, &Renderer::new())?;

    let remote_node = remote_join(REMOTE_CONFIG_DIR, NODE_PROPERTIES);
    let existing = match cx.download(&remote_node).await? {
        Some(bytes) => Some(
            Properties::parse(&String::from_utf8_lossy(&bytes)).map_err(|reason| {
                AdminError::MalformedFile {
                    path: PathBuf::from(&remote_node),
                    reason,
                }
            })?,
        ),
        None => None,
    };
    let source = config.assign_node_id(existing.as_ref());
    match source {
        NodeIdSource::Generated => info!(host = %host, "Assigned a new node.id"),
        NodeIdSource::Remote | NodeIdSource::Local => {
            debug!(host = %host, ?source, "Keeping node.id")
        }
    }

    config.validate(cx.has_role(Role::Coordinator))?;

    cx.sudo(&format!("mkdir -p {}", REMOTE_CONFIG_DIR)).await?;
    for (name, contents) in config.files() {
        cx.upload(contents.as_bytes(), &remote_join(REMOTE_CONFIG_DIR, name), true)
            .await?;
    }
    cx.say("Deployed configuration");
    Ok(())
}

fn file_for(which: &str) -> Result<&'static str> {
    match which {
        "node" => Ok(NODE_PROPERTIES),
        "jvm" => Ok(JVM_CONFIG),
        "config" => Ok(CONFIG_PROPERTIES),
        "log" => Ok(LOG_PROPERTIES),
        other => Err(AdminError::config(format!(
            "Unknown configuration file '{}'. Expected one of node, jvm, config, log",
            other
        ))),
    }
}

async fn show_configuration(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let files = match args.first() {
        Some(which) => vec![file_for(which)?],
        None => vec![NODE_PROPERTIES, JVM_CONFIG, CONFIG_PROPERTIES, LOG_PROPERTIES],
    };
    let mut shown = String::new();
    for name in files {
        let path = remote_join(REMOTE_CONFIG_DIR, name);
        match cx.download(&path).await? {
            Some(bytes) => {
                shown.push_str(&format!("{}:\n{}\n", path, String::from_utf8_lossy(&bytes)));
            }
            None => shown.push_str(&format!("{}: not found\n", path)),
        }
    }
    println!("{}:\n{}", cx.host_key(), shown);
    Ok(TaskValue::Text(shown))
}
