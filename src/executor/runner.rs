//! Runs one task on one host.

use crate::error::Result;
use crate::executor::context::ExecutionContext;
use crate::executor::result::TaskValue;
use crate::executor::task::{HostContext, Task};
use crate::executor::Executor;
use crate::host::Host;

/// Binds `host` on `ctx`, connects (or reuses the cached connection), and
/// runs the task body. The host binding is undone on every exit path.
pub async fn run_on_host(
    executor: &Executor,
    ctx: &mut ExecutionContext,
    task: &Task,
    host: &Host,
    args: &[String],
) -> Result<TaskValue> {
    let mut scope = ctx.host_scope(host);
    let target = scope.connection.clone();
    let transport = scope
        .connections
        .get_or_connect(executor.connector(), &target)
        .await?;
    let cx = HostContext {
        host: Some(host.clone()),
        connection: Some(target),
        transport: Some(transport),
        executor: executor.clone(),
        command: scope.command.clone(),
        targets: scope.targets.clone(),
    };
    task.call(cx, args.to_vec()).await
}

/// Runs the task once with no host bound and no connection.
pub async fn run_local(
    executor: &Executor,
    ctx: &ExecutionContext,
    task: &Task,
    args: &[String],
) -> Result<TaskValue> {
    let cx = HostContext {
        host: None,
        connection: None,
        transport: None,
        executor: executor.clone(),
        command: ctx.command.clone(),
        targets: ctx.targets.clone(),
    };
    task.call(cx, args.to_vec()).await
}
