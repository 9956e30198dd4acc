//! Serial dispatch: one host after another on a single shared context.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::executor::context::ExecutionContext;
use crate::executor::policy::{classify_error, Disposition, FailurePolicy};
use crate::executor::result::{HostResult, ResultCollector, ResultMap, TaskValue, LOCAL_ONLY};
use crate::executor::runner;
use crate::executor::task::Task;
use crate::executor::{Abort, Executor};
use crate::host::Host;
use crate::logging::report_host_warning;

pub async fn dispatch(
    executor: &Executor,
    ctx: &mut ExecutionContext,
    task: &Arc<Task>,
    hosts: &[Host],
    args: &[String],
) -> std::result::Result<ResultMap, Abort> {
    let policy = FailurePolicy::from(executor.settings());
    let mut collector = ResultCollector::new();

    for host in hosts {
        let key = host.key();
        debug!(task = task.name(), host = %key, "Running");
        let outcome = runner::run_on_host(executor, ctx, task, host, args).await;
        if ctx.settings.eagerly_disconnect {
            ctx.connections.disconnect(&key).await;
        }
        store(&policy, task, &mut collector, key, outcome)?;
    }
    Ok(collector.into_map())
}

/// Runs a task that has no hosts exactly once, keyed by `LOCAL_ONLY`.
pub async fn dispatch_local(
    executor: &Executor,
    ctx: &mut ExecutionContext,
    task: &Arc<Task>,
    args: &[String],
) -> std::result::Result<ResultMap, Abort> {
    let policy = FailurePolicy::from(executor.settings());
    let mut collector = ResultCollector::new();
    let outcome = runner::run_local(executor, ctx, task, args).await;
    store(&policy, task, &mut collector, LOCAL_ONLY.to_string(), outcome)?;
    Ok(collector.into_map())
}

fn store(
    policy: &FailurePolicy,
    task: &Task,
    collector: &mut ResultCollector,
    key: String,
    outcome: Result<TaskValue>,
) -> std::result::Result<(), Abort> {
    let error = match outcome {
        Ok(value) => {
            collector.insert(key, HostResult::Success(value));
            return Ok(());
        }
        Err(err) => Arc::new(err),
    };

    match policy.dispose(classify_error(&error)) {
        Disposition::Continue | Disposition::Warn => {
            report_host_warning(&key, &error);
            collector.insert(key, HostResult::Failed(error));
            Ok(())
        }
        Disposition::Abort | Disposition::Raise => {
            debug!(task = task.name(), host = %key, "Stopping serial dispatch");
            collector.insert(key.clone(), HostResult::Failed(Arc::clone(&error)));
            Err(Abort {
                task: task.name().to_string(),
                host: (key != LOCAL_ONLY).then_some(key),
                error,
                partial: std::mem::take(collector).into_map(),
            })
        }
    }
}
