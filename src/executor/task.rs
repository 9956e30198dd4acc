//! Tasks and the context a task body runs in.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::config::Settings;
use crate::error::{AdminError, Result};
use crate::executor::result::{TaskValue, LOCAL_ONLY};
use crate::executor::{Executor, Targets};
use crate::host::{Host, Role, RoleTable};
use crate::logging::report_host_warning;
use crate::session::{ConnectionSettings, Output, Transport};

pub type TaskFuture = BoxFuture<'static, Result<TaskValue>>;

type TaskBody = Arc<dyn Fn(HostContext, Vec<String>) -> TaskFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub optional: bool,
}

/// A named unit of administrative work.
#[derive(Clone)]
pub struct Task {
    name: String,
    summary: &'static str,
    help: &'static str,
    args: Vec<ArgSpec>,
    roles: Vec<Role>,
    hosts: Vec<String>,
    parallel: bool,
    local_only: bool,
    body: TaskBody,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("roles", &self.roles)
            .field("hosts", &self.hosts)
            .field("parallel", &self.parallel)
            .field("local_only", &self.local_only)
            .finish()
    }
}

impl Task {
    /// Creates a task. `name` is its command path, e.g. `server start`.
    pub fn new<F, Fut>(name: &str, body: F) -> Self
    where
        F: Fn(HostContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskValue>> + Send + 'static,
    {
        Self {
            name: name
                .split(|c: char| c == '.' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            summary: "",
            help: "",
            args: vec![],
            roles: vec![],
            hosts: vec![],
            parallel: false,
            local_only: false,
            body: Arc::new(move |cx, args| body(cx, args).boxed()),
        }
    }

    pub fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn help(mut self, help: &'static str) -> Self {
        self.help = help;
        self
    }

    pub fn arg(mut self, name: &'static str) -> Self {
        self.args.push(ArgSpec {
            name,
            optional: false,
        });
        self
    }

    pub fn optional_arg(mut self, name: &'static str) -> Self {
        self.args.push(ArgSpec {
            name,
            optional: true,
        });
        self
    }

    /// Default roles, used when the caller names neither hosts nor roles.
    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    /// Default hosts, used when the caller names neither hosts nor roles.
    pub fn hosts(mut self, hosts: &[&str]) -> Self {
        self.hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Runs once on the admin machine, whatever hosts were asked for.
    pub fn local(mut self) -> Self {
        self.local_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.name.split(' ')
    }

    pub fn get_summary(&self) -> &str {
        self.summary
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub fn default_roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn default_hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn is_local(&self) -> bool {
        self.local_only
    }

    /// Checks `given` positional arguments against the declared ones.
    pub fn check_arity(&self, given: usize) -> Result<()> {
        let required = self.args.iter().filter(|a| !a.optional).count();
        let total = self.args.len();
        if given < required || given > total {
            let expected = if required == total {
                required.to_string()
            } else {
                format!("{} to {}", required, total)
            };
            return Err(AdminError::ArgumentMismatch {
                task: self.name.clone(),
                expected,
                given,
            });
        }
        Ok(())
    }

    /// One-line usage, e.g. `presto-admin file copy <local_file> [remote_dir]`.
    pub fn usage(&self) -> String {
        let mut usage = format!("presto-admin {}", self.name);
        for arg in &self.args {
            if arg.optional {
                usage.push_str(&format!(" [{}]", arg.name));
            } else {
                usage.push_str(&format!(" <{}>", arg.name));
            }
        }
        usage
    }

    /// Usage, summary, and detailed help.
    pub fn detailed_help(&self) -> String {
        let mut text = format!("Usage: {}\n", self.usage());
        if !self.summary.is_empty() {
            text.push_str(&format!("\n{}\n", self.summary));
        }
        if !self.help.is_empty() {
            text.push_str(&format!("\n{}\n", self.help.trim()));
        }
        text
    }

    pub fn call(&self, cx: HostContext, args: Vec<String>) -> TaskFuture {
        (self.body)(cx, args)
    }
}

/// Everything a task body gets to work with for one host.
#[derive(Clone)]
pub struct HostContext {
    pub(crate) host: Option<Host>,
    pub(crate) connection: Option<ConnectionSettings>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) executor: Executor,
    pub(crate) command: String,
    pub(crate) targets: Targets,
}

impl HostContext {
    pub fn host(&self) -> Result<&Host> {
        self.host.as_ref().ok_or(AdminError::NoHost)
    }

    /// Host string for messages and result keys.
    pub fn host_key(&self) -> String {
        self.host
            .as_ref()
            .map(Host::key)
            .unwrap_or_else(|| LOCAL_ONLY.to_string())
    }

    pub fn connection(&self) -> Option<&ConnectionSettings> {
        self.connection.as_ref()
    }

    pub fn transport(&self) -> Result<&Arc<dyn Transport>> {
        self.transport.as_ref().ok_or(AdminError::NoHost)
    }

    pub fn settings(&self) -> &Settings {
        self.executor.settings()
    }

    pub fn roles(&self) -> &RoleTable {
        self.executor.roles()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Command name of the running invocation.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Hosts and roles the invocation asked for. Local tasks pass these on
    /// when they dispatch to hosts themselves.
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.host
            .as_ref()
            .map(|host| self.roles().has_role(host, role))
            .unwrap_or(false)
    }

    /// Runs `command`, failing on a non-zero exit.
    pub async fn run(&self, command: &str) -> Result<Output> {
        self.transport()?
            .run(command)
            .await?
            .check(&self.host_key(), command)
    }

    /// Runs `command` and hands back its output whatever the exit code.
    pub async fn run_unchecked(&self, command: &str) -> Result<Output> {
        self.transport()?.run(command).await
    }

    /// Runs `command` as root, failing on a non-zero exit.
    pub async fn sudo(&self, command: &str) -> Result<Output> {
        self.transport()?
            .sudo(command)
            .await?
            .check(&self.host_key(), command)
    }

    pub async fn sudo_unchecked(&self, command: &str) -> Result<Output> {
        self.transport()?.sudo(command).await
    }

    pub async fn upload(&self, contents: &[u8], remote: &str, use_sudo: bool) -> Result<()> {
        self.transport()?.upload(contents, remote, use_sudo).await
    }

    pub async fn download(&self, remote: &str) -> Result<Option<Vec<u8>>> {
        self.transport()?.download(remote).await
    }

    pub async fn put(&self, local: &Path, remote: &str, use_sudo: bool) -> Result<()> {
        self.transport()?.put(local, remote, use_sudo).await
    }

    pub async fn get(&self, remote: &str, local: &Path) -> Result<bool> {
        self.transport()?.get(remote, local).await
    }

    /// Prints `Warning: [host] message`.
    pub fn warn(&self, message: impl fmt::Display) {
        report_host_warning(&self.host_key(), message);
    }

    /// Prints one line of task output under the host prefix.
    pub fn say(&self, message: impl fmt::Display) {
        println!("[{}] {}", self.host_key(), message);
    }
}
