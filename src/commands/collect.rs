//! Gathering diagnostics from the cluster onto the admin machine.

use tracing::debug;

use crate::commands::{remote_join, ALL_ROLES, PACKAGE_NAME, REMOTE_LOG_DIR};
use crate::error::Result;
use crate::executor::{HostContext, Task, TaskValue};

const LOG_FILES: [&str; 3] = ["server.log", "launcher.log", "http-request.log"];

pub fn logs() -> Task {
    Task::new("collect logs", collect_logs)
        .summary("Download the Presto logs of every host")
        .help("Logs are written to <log-dir>/logs/<host>/.")
        .local()
}

/// Per-host half of `collect logs`. Not a command of its own.
fn fetch_logs() -> Task {
    Task::new("collect fetch_logs", fetch_host_logs)
        .roles(&ALL_ROLES)
        .parallel()
}

pub fn system_info() -> Task {
    Task::new("collect system_info", collect_system_info)
        .summary("Gather operating system, Java, and package information from every host")
        .help("One report per host is written to <log-dir>/system_info/<host>.txt.")
        .roles(&ALL_ROLES)
        .parallel()
}

async fn collect_logs(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let results = cx
        .executor()
        .execute(fetch_logs(), vec![], cx.targets().clone())
        .await?;
    cx.say(format!(
        "Logs downloaded to {}",
        cx.settings().log_dir.join("logs").display()
    ));
    Ok(TaskValue::Nested(results))
}

async fn fetch_host_logs(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let dest = cx.settings().log_dir.join("logs").join(cx.host_key());
    let mut fetched = 0;
    for name in LOG_FILES {
        if cx.get(&remote_join(REMOTE_LOG_DIR, name), &dest.join(name)).await? {
            fetched += 1;
        } else {
            debug!(host = %cx.host_key(), file = name, "No such log");
        }
    }
    if fetched == 0 {
        cx.warn(format!("No logs found in {}", REMOTE_LOG_DIR));
    }
    Ok(TaskValue::None)
}

async fn collect_system_info(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let checks = [
        ("Operating system", "uname -a".to_string()),
        ("Java", "java -version 2>&1".to_string()),
        ("Presto package", format!("rpm -q {}", PACKAGE_NAME)),
    ];
    let mut report = format!("Host: {}\n", cx.host_key());
    for (label, command) in &checks {
        let output = cx.run_unchecked(command).await?;
        let text = if output.succeeded() {
            output.stdout.trim().to_string()
        } else {
            "unavailable".to_string()
        };
        report.push_str(&format!("{}: {}\n", label, text));
    }

    let dest = cx
        .settings()
        .log_dir
        .join("system_info")
        .join(format!("{}.txt", cx.host_key()));
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, &report).await?;
    cx.say(format!("System information written to {}", dest.display()));
    Ok(TaskValue::Text(report))
}
