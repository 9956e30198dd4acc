//! Installing and running the Presto server.

use std::path::Path;

use tracing::{debug, info};

use crate::commands::configuration::deploy_node_config;
use crate::commands::{
    file_name, remote_join, ALL_ROLES, PACKAGE_NAME, REMOTE_CONFIG_DIR, REMOTE_TMP_DIR, SERVICE_NAME,
};
use crate::conf::{CONFIG_PROPERTIES, JVM_CONFIG, LOG_PROPERTIES, NODE_PROPERTIES};
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::host::Role;
use crate::session::shell_quote;

pub fn install() -> Task {
    Task::new("server install", install_server)
        .arg("rpm_path")
        .summary("Install the Presto server RPM and deploy its configuration")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn uninstall() -> Task {
    Task::new("server uninstall", uninstall_server)
        .summary("Stop the server and remove the Presto RPM")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn upgrade() -> Task {
    Task::new("server upgrade", upgrade_server)
        .arg("rpm_path")
        .summary("Upgrade the Presto RPM, keeping the deployed configuration")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn start() -> Task {
    Task::new("server start", start_server)
        .summary("Start the Presto server")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn stop() -> Task {
    Task::new("server stop", stop_server)
        .summary("Stop the Presto server")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn restart() -> Task {
    Task::new("server restart", restart_server)
        .summary("Restart the Presto server")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn status() -> Task {
    Task::new("server status", server_status)
        .summary("Show whether the server is running and which version is installed")
        .roles(&ALL_ROLES)
        .parallel()
}

/// Uploads a local RPM to the host's temp directory and returns where it went.
async fn upload_rpm(cx: &HostContext, rpm_path: &str) -> Result<String> {
    let local = Path::new(rpm_path);
    if !local.is_file() {
        return Err(AdminError::config(format!("RPM file not found: {}", rpm_path)));
    }
    let remote = remote_join(REMOTE_TMP_DIR, &file_name(rpm_path)?);
    debug!(host = %cx.host_key(), remote = %remote, "Uploading RPM");
    cx.put(local, &remote, false).await?;
    Ok(remote)
}

async fn install_server(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let remote = upload_rpm(&cx, &args[0]).await?;
    cx.sudo(&format!("rpm -i --nodeps {}", shell_quote(&remote))).await?;
    cx.sudo(&format!("rm -f {}", shell_quote(&remote))).await?;
    cx.say("Package installed");
    deploy_node_config(&cx).await?;
    Ok(TaskValue::None)
}

async fn uninstall_server(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let stopped = cx.sudo_unchecked(&format!("service {} stop", SERVICE_NAME)).await?;
    if !stopped.succeeded() {
        debug!(host = %cx.host_key(), "Server was not running");
    }
    cx.sudo(&format!("rpm -e {}", PACKAGE_NAME)).await?;
    cx.say("Package uninstalled");
    Ok(TaskValue::None)
}

async fn upgrade_server(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let mut backup = vec![];
    for name in [NODE_PROPERTIES, JVM_CONFIG, CONFIG_PROPERTIES, LOG_PROPERTIES] {
        let path = remote_join(REMOTE_CONFIG_DIR, name);
        if let Some(contents) = cx.download(&path).await? {
            backup.push((path, contents));
        }
    }
    info!(host = %cx.host_key(), files = backup.len(), "Backed up configuration");

    let remote = upload_rpm(&cx, &args[0]).await?;
    cx.sudo(&format!("rpm -U --nodeps {}", shell_quote(&remote))).await?;
    cx.sudo(&format!("rm -f {}", shell_quote(&remote))).await?;

    cx.sudo(&format!("mkdir -p {}", REMOTE_CONFIG_DIR)).await?;
    for (path, contents) in &backup {
        cx.upload(contents, path, true).await?;
    }
    cx.say("Package upgraded");
    Ok(TaskValue::None)
}

async fn start_server(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    cx.sudo(&format!("service {} start", SERVICE_NAME)).await?;
    let status = cx.sudo_unchecked(&format!("service {} status", SERVICE_NAME)).await?;
    if status.succeeded() {
        cx.say("Server started");
    } else {
        cx.warn("Server failed to start. Check the server log for details");
    }
    Ok(TaskValue::None)
}

async fn stop_server(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    cx.sudo(&format!("service {} stop", SERVICE_NAME)).await?;
    cx.say("Server stopped");
    Ok(TaskValue::None)
}

async fn restart_server(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let stopped = cx.sudo_unchecked(&format!("service {} stop", SERVICE_NAME)).await?;
    if !stopped.succeeded() {
        debug!(host = %cx.host_key(), "Server was not running before restart");
    }
    start_server(cx, args).await
}

async fn server_status(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let version = cx
        .run_unchecked(&format!("rpm -q --qf '%{{VERSION}}' {}", PACKAGE_NAME))
        .await?;
    let version = if version.succeeded() {
        version.stdout.trim().to_string()
    } else {
        "not installed".to_string()
    };
    let running = cx
        .sudo_unchecked(&format!("service {} status", SERVICE_NAME))
        .await?
        .succeeded();
    let role = if cx.has_role(Role::Coordinator) {
        "coordinator"
    } else {
        "worker"
    };
    let summary = format!(
        "Server version: {}, role: {}, running: {}",
        version, role, running
    );
    cx.say(&summary);
    Ok(TaskValue::Text(summary))
}
