//! Copying and running arbitrary files on the cluster.

use std::path::Path;

use crate::commands::{arg_or, file_name, remote_join, ALL_ROLES, REMOTE_TMP_DIR};
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::session::shell_quote;

pub fn copy() -> Task {
    Task::new("file copy", copy_file)
        .arg("local_file")
        .optional_arg("remote_dir")
        .summary("Copy a file to every host")
        .help("The file lands in /tmp unless remote_dir is given.")
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn run() -> Task {
    Task::new("file run", run_script)
        .arg("script")
        .optional_arg("remote_dir")
        .summary("Copy a script to every host and run it as root")
        .help("The script is copied to remote_dir (default /tmp), run, and removed.")
        .roles(&ALL_ROLES)
        .parallel()
}

fn local_file(path: &str) -> Result<&Path> {
    let local = Path::new(path);
    if local.is_file() {
        Ok(local)
    } else {
        Err(AdminError::config(format!("File not found: {}", path)))
    }
}

async fn copy_file(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let local = local_file(&args[0])?;
    let remote = remote_join(arg_or(&args, 1, REMOTE_TMP_DIR), &file_name(&args[0])?);
    cx.put(local, &remote, true).await?;
    cx.say(format!("Copied {} to {}", args[0], remote));
    Ok(TaskValue::None)
}

async fn run_script(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let local = local_file(&args[0])?;
    let remote = remote_join(arg_or(&args, 1, REMOTE_TMP_DIR), &file_name(&args[0])?);
    let quoted = shell_quote(&remote);
    cx.put(local, &remote, true).await?;
    cx.sudo(&format!("chmod u+x {}", quoted)).await?;
    let output = cx.sudo(&quoted).await;
    cx.sudo_unchecked(&format!("rm -f {}", quoted)).await?;
    let output = output?;
    for line in output.stdout.lines() {
        cx.say(line);
    }
    Ok(TaskValue::Text(output.stdout))
}
