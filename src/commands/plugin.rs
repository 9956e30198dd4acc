use std::path::Path;

use crate::commands::{arg_or, file_name, remote_join, ALL_ROLES, REMOTE_PLUGIN_DIR};
use crate::error::{AdminError, Result};
use crate::executor::{HostContext, Task, TaskValue};
use crate::session::shell_quote;

pub fn add_jar() -> Task {
    Task::new("plugin add_jar", add_plugin_jar)
        .arg("jar")
        .arg("plugin_name")
        .optional_arg("plugin_dir")
        .summary("Deploy a jar into a plugin's directory")
        .help(
            "Copies the jar to <plugin_dir>/<plugin_name>/ on every host. plugin_dir \
             defaults to /usr/lib/presto/lib/plugin. Restart the server to load it.",
        )
        .roles(&ALL_ROLES)
        .parallel()
}

async fn add_plugin_jar(cx: HostContext, args: Vec<String>) -> Result<TaskValue> {
    let jar = Path::new(&args[0]);
    if !jar.is_file() {
        return Err(AdminError::config(format!("Jar not found: {}", args[0])));
    }
    let dir = remote_join(arg_or(&args, 2, REMOTE_PLUGIN_DIR), &args[1]);
    cx.sudo(&format!("mkdir -p {}", shell_quote(&dir))).await?;
    let remote = remote_join(&dir, &file_name(&args[0])?);
    cx.put(jar, &remote, true).await?;
    cx.say(format!("Deployed {} to {}", args[0], remote));
    Ok(TaskValue::None)
}
