//! Parallel dispatch.
//!
//! Every host gets its own tokio task running on a snapshot of the
//! invocation context, with at most `pool_size` running at once. Workers
//! report back over a flume channel; the dispatcher drains reports while it
//! is still spawning and again after the last job is out, then joins every
//! job. A worker that never reports (panic, cancellation) is stored as
//! terminated.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AdminError;
use crate::executor::context::ExecutionContext;
use crate::executor::policy::{classify_result, Disposition, FailurePolicy};
use crate::executor::result::{HostResult, ResultCollector, ResultMap};
use crate::executor::runner;
use crate::executor::task::Task;
use crate::executor::{Abort, Executor};
use crate::host::Host;
use crate::logging::{report_fatal_message, report_host_error, report_host_warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Errored,
    TimedOut,
}

impl JobState {
    fn of(result: &HostResult) -> Self {
        match result {
            HostResult::Success(_) => JobState::Completed,
            HostResult::Failed(err) if matches!(**err, AdminError::JobTimedOut { .. }) => {
                JobState::TimedOut
            }
            _ => JobState::Errored,
        }
    }
}

/// One host's worker.
#[derive(Debug)]
pub struct Job {
    pub name: String,
    pub state: JobState,
    handle: JoinHandle<i32>,
}

/// What a worker sends back when it's done.
struct Report {
    name: String,
    result: HostResult,
}

impl Job {
    fn spawn(
        executor: Executor,
        mut ctx: ExecutionContext,
        task: Arc<Task>,
        host: Host,
        args: Vec<String>,
        permit: Option<OwnedSemaphorePermit>,
        reports: flume::Sender<Report>,
    ) -> Self {
        let name = host.key();
        let job_timeout = ctx.settings.job_timeout;
        let handle = tokio::spawn({
            let name = name.clone();
            async move {
                let _permit = permit;
                let run = async {
                    let run = runner::run_on_host(&executor, &mut ctx, &task, &host, &args);
                    match job_timeout {
                        Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                            Err(AdminError::JobTimedOut {
                                seconds: limit.as_secs(),
                            })
                        }),
                        None => run.await,
                    }
                };
                let result = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(outcome) => HostResult::from_outcome(outcome),
                    Err(panic) => HostResult::Terminated(panic_message(panic.as_ref())),
                };
                ctx.connections.disconnect_all().await;

                let code = if result.is_success() { 0 } else { 1 };
                if reports.send(Report { name, result }).is_err() {
                    warn!("Result channel closed before the worker reported");
                }
                code
            }
        });
        Self {
            name,
            state: JobState::Running,
            handle,
        }
    }

    /// Waits for the worker and returns its exit code.
    async fn join(self) -> (String, JobState, std::result::Result<i32, String>) {
        let outcome = self.handle.await.map_err(|e| e.to_string());
        (self.name, self.state, outcome)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Collects reports and tracks what the failure policy made of them.
struct Tally<'a> {
    task: &'a Task,
    policy: FailurePolicy,
    collector: ResultCollector,
    fatal: bool,
    raised: Option<(String, Arc<AdminError>)>,
}

impl Tally<'_> {
    fn record(&mut self, report: Report, jobs: &mut [Job]) {
        if let Some(job) = jobs.iter_mut().find(|job| job.name == report.name) {
            job.state = JobState::of(&report.result);
        }
        match self.policy.dispose(classify_result(&report.result)) {
            Disposition::Continue => {}
            Disposition::Warn => report_host_warning(&report.name, describe(&report.result)),
            Disposition::Abort => {
                report_host_error(&report.name, describe(&report.result));
                self.fatal = true;
            }
            Disposition::Raise => {
                if let (None, HostResult::Failed(err)) = (&self.raised, &report.result) {
                    self.raised = Some((report.name.clone(), Arc::clone(err)));
                }
            }
        }
        self.collector.insert(report.name, report.result);
    }
}

fn describe(result: &HostResult) -> String {
    match result {
        HostResult::Success(_) => "succeeded".to_string(),
        HostResult::Failed(err) => err.to_string(),
        HostResult::Terminated(reason) => format!("Worker terminated: {}", reason),
    }
}

pub async fn dispatch(
    executor: &Executor,
    ctx: &ExecutionContext,
    task: &Arc<Task>,
    hosts: &[Host],
    args: &[String],
) -> std::result::Result<ResultMap, Abort> {
    let (report_tx, report_rx) = flume::unbounded::<Report>();
    let permits = Arc::new(Semaphore::new(ctx.pool_size));
    let mut jobs: Vec<Job> = Vec::with_capacity(hosts.len());
    let mut tally = Tally {
        task,
        policy: FailurePolicy::from(executor.settings()),
        collector: ResultCollector::new(),
        fatal: false,
        raised: None,
    };

    for host in hosts {
        let permit = Arc::clone(&permits).acquire_owned().await.ok();
        while let Ok(report) = report_rx.try_recv() {
            tally.record(report, &mut jobs);
        }
        debug!(task = task.name(), host = %host, "Spawning job");
        jobs.push(Job::spawn(
            executor.clone(),
            ctx.snapshot_for(host),
            Arc::clone(task),
            host.clone(),
            args.to_vec(),
            permit,
            report_tx.clone(),
        ));
    }
    drop(report_tx);

    while let Ok(report) = report_rx.recv_async().await {
        tally.record(report, &mut jobs);
    }

    let mut any_failed = false;
    for job in jobs {
        let (name, state, outcome) = job.join().await;
        match outcome {
            Ok(code) => {
                debug!(job = %name, ?state, code, "Job finished");
                any_failed |= code != 0;
            }
            Err(reason) => {
                error!(job = %name, "Job did not finish: {}", reason);
                any_failed = true;
                if !tally.collector.contains(&name) {
                    let result = HostResult::Terminated(reason);
                    report_host_error(&name, describe(&result));
                    tally.fatal = true;
                    tally.collector.insert(name, result);
                }
            }
        }
    }

    let results = tally.collector.into_map();
    if let Some((host, error)) = tally.raised {
        return Err(Abort {
            task: tally.task.name().to_string(),
            host: Some(host),
            error,
            partial: results,
        });
    }
    if any_failed && tally.fatal {
        report_fatal_message("One or more hosts failed");
    }
    Ok(results)
}
