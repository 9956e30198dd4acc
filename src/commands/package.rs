use std::path::Path;

use crate::commands::{file_name, remote_join, ALL_ROLES, REMOTE_TMP_DIR};
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::session::shell_quote;

pub fn install() -> Task {
    Task::new("package install", install_package)
        .arg("local_path")
        .summary("Install an RPM package on the cluster")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn uninstall() -> Task {
    Task::new("package uninstall", uninstall_package)
        .arg("name")
        .summary("Remove an RPM package from the cluster")
        .roles(&ALL_ROLES)
        .parallel()
}

async fn install_package(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let local = Path::new(&args[0]);
    if !local.is_file() {
        return Err(AdminError::config(format!("Package not found: {}", args[0])));
    }
    let remote = remote_join(REMOTE_TMP_DIR, &file_name(&args[0])?);
    cx.put(local, &remote, false).await?;
    let installed = cx.sudo(&format!("rpm -i --nodeps {}", shell_quote(&remote))).await;
    cx.sudo_unchecked(&format!("rm -f {}", shell_quote(&remote)))
        .await?;
    installed?;
    cx.say(format!("Package installed from {}", args[0]));
    Ok(TaskValue::None)
}

async fn uninstall_package(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    cx.sudo(&format!("rpm -e {}", shell_quote(&args[0]))).await?;
    cx.say(format!("Package {} uninstalled", args[0]));
    Ok(TaskValue::None)
}
