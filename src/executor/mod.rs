//! Multi-host task execution.
//!
//! `Executor::execute` resolves a task, expands the effective host list,
//! and hands it to the serial or the parallel dispatcher. Per-host failures
//! become stored results; only the failure policy's fatal paths end a
//! dispatch early, and those come back as `Abort` with what was collected
//! so far.

mod context;
mod parallel;
mod policy;
mod registry;
mod result;
mod runner;
mod serial;
mod task;

pub use context::{ExecutionContext, HostScope};
pub use parallel::{Job, JobState};
pub use policy::{
    classify, classify_error, classify_result, exit_code, Classification, Disposition,
    FailurePolicy,
};
pub use registry::Registry;
pub use result::{HostResult, ResultCollector, ResultMap, TaskValue, LOCAL_ONLY};
pub use task::{ArgSpec, HostContext, Task, TaskFuture};

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::AdminError;
use crate::host::{Host, Role, RoleTable};
use crate::logging::report_warning;
use crate::session::Connector;

/// Which hosts an `execute()` call should run on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub hosts: Option<Vec<String>>,
    pub roles: Option<Vec<Role>>,
    pub exclude_hosts: Vec<String>,
}

impl Targets {
    pub fn hosts<S: AsRef<str>>(hosts: &[S]) -> Self {
        Self {
            hosts: Some(hosts.iter().map(|h| h.as_ref().to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            roles: Some(roles.to_vec()),
            ..Self::default()
        }
    }

    pub fn exclude<S: AsRef<str>>(mut self, hosts: &[S]) -> Self {
        self.exclude_hosts
            .extend(hosts.iter().map(|h| h.as_ref().to_string()));
        self
    }
}

/// A task given by name or directly.
#[derive(Debug, Clone)]
pub enum TaskRef {
    Name(String),
    Task(Arc<Task>),
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        TaskRef::Name(name.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(name: String) -> Self {
        TaskRef::Name(name)
    }
}

impl From<Arc<Task>> for TaskRef {
    fn from(task: Arc<Task>) -> Self {
        TaskRef::Task(task)
    }
}

impl From<&Arc<Task>> for TaskRef {
    fn from(task: &Arc<Task>) -> Self {
        TaskRef::Task(Arc::clone(task))
    }
}

impl From<Task> for TaskRef {
    fn from(task: Task) -> Self {
        TaskRef::Task(Arc::new(task))
    }
}

/// A dispatch that ended on a fatal error.
#[derive(Debug)]
pub struct Abort {
    pub task: String,
    /// Host the fatal error came from, if any.
    pub host: Option<String>,
    pub error: Arc<AdminError>,
    /// Results stored before the abort, the failing host included.
    pub partial: ResultMap,
}

impl Abort {
    pub fn new(task: &str, error: AdminError) -> Self {
        Self {
            task: task.to_string(),
            host: None,
            error: Arc::new(error),
            partial: ResultMap::new(),
        }
    }

    pub fn is_argument_mismatch(&self) -> bool {
        match self.error.as_ref() {
            AdminError::ArgumentMismatch { .. } => true,
            AdminError::Aborted(inner) => inner.is_argument_mismatch(),
            _ => false,
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "[{}] {}", host, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl StdError for Abort {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

struct Inner {
    settings: Arc<Settings>,
    roles: RoleTable,
    registry: Registry,
    connector: Arc<dyn Connector>,
}

/// Runs tasks against the cluster. Cheap to clone; tasks get a handle
/// through their `HostContext` and may call `execute()` themselves.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Executor {
    pub fn new(
        settings: Settings,
        roles: RoleTable,
        registry: Registry,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Arc::new(settings),
                roles,
                registry,
                connector,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn roles(&self) -> &RoleTable {
        &self.inner.roles
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn connector(&self) -> &dyn Connector {
        self.inner.connector.as_ref()
    }

    /// Runs `task` on every host `targets` selects and returns one result
    /// per host.
    pub async fn execute(
        &self,
        task: impl Into<TaskRef>,
        args: Vec<String>,
        targets: Targets,
    ) -> Result<ResultMap, Abort> {
        let task = match task.into() {
            TaskRef::Task(task) => task,
            TaskRef::Name(name) => match self.registry().resolve(&name) {
                Some(task) => task,
                None if self.settings().skip_unknown_tasks => {
                    report_warning(format!("Skipping invalid task name: {}", name));
                    return Ok(ResultMap::new());
                }
                None => return Err(Abort::new(&name, AdminError::UnknownTask(name.clone()))),
            },
        };
        task.check_arity(args.len())
            .map_err(|e| Abort::new(task.name(), e))?;

        let hosts = self
            .effective_hosts(&task, &targets)
            .map_err(|e| Abort::new(task.name(), e))?;

        let mut ctx = ExecutionContext::new(
            Arc::clone(&self.inner.settings),
            task.name(),
            args.clone(),
            targets,
        );
        ctx.hosts = hosts.clone();
        ctx.parallel = task.is_parallel() && self.settings().parallel;
        ctx.pool_size = self
            .settings()
            .pool_size
            .map_or(hosts.len(), |max| max.min(hosts.len()))
            .max(1);

        if hosts.is_empty() {
            debug!(task = task.name(), "Running local-only");
            return serial::dispatch_local(self, &mut ctx, &task, &args).await;
        }

        info!(
            task = task.name(),
            hosts = %hosts.iter().join(","),
            parallel = ctx.parallel,
            pool_size = ctx.pool_size,
            "Dispatching"
        );
        let results = if ctx.parallel {
            parallel::dispatch(self, &ctx, &task, &hosts, &args).await
        } else {
            serial::dispatch(self, &mut ctx, &task, &hosts, &args).await
        };
        ctx.connections.disconnect_all().await;
        results
    }

    /// (explicit hosts ∪ role hosts) − excluded hosts, in first-seen order
    /// with duplicates removed. Falls back to the task's default bindings
    /// when `targets` names neither hosts nor roles. Local tasks get none.
    pub fn effective_hosts(&self, task: &Task, targets: &Targets) -> Result<Vec<Host>, AdminError> {
        if task.is_local() {
            return Ok(vec![]);
        }
        let (hosts, roles) = if targets.hosts.is_none() && targets.roles.is_none() {
            (task.default_hosts().to_vec(), task.default_roles().to_vec())
        } else {
            (
                targets.hosts.clone().unwrap_or_default(),
                targets.roles.clone().unwrap_or_default(),
            )
        };

        let mut expanded = Vec::with_capacity(hosts.len());
        for host in &hosts {
            match self.roles().find(host) {
                Some(known) => expanded.push(known.clone()),
                None => expanded.push(host.parse::<Host>()?),
            }
        }
        for role in roles {
            expanded.extend(self.roles().hosts(role).iter().cloned());
        }

        let excluded = |host: &Host| {
            targets
                .exclude_hosts
                .iter()
                .any(|x| *x == host.key() || *x == host.hostname)
        };
        Ok(expanded
            .into_iter()
            .filter(|host| !excluded(host))
            .unique_by(Host::key)
            .collect())
    }
}
