//! Per-invocation execution state.
//!
//! One `ExecutionContext` is created for every `execute()` call and passed
//! by reference through the dispatchers. Serial dispatch reuses the same
//! context for every host, so the per-host connection settings are bound
//! through `HostScope`, which puts the previous settings back however the
//! scope ends.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::trace;

use crate::config::Settings;
use crate::executor::Targets;
use crate::host::Host;
use crate::session::{ConnectionCache, ConnectionSettings};

pub struct ExecutionContext {
    pub settings: Arc<Settings>,
    /// Name of the task being run.
    pub command: String,
    pub args: Vec<String>,
    /// Effective host list.
    pub hosts: Vec<Host>,
    pub exclude_hosts: Vec<String>,
    /// What the caller asked for, before expansion.
    pub targets: Targets,
    pub parallel: bool,
    pub pool_size: usize,
    pub current_host: Option<Host>,
    pub connection: ConnectionSettings,
    pub connections: ConnectionCache,
}

impl ExecutionContext {
    pub fn new(settings: Arc<Settings>, command: &str, args: Vec<String>, targets: Targets) -> Self {
        let connection = ConnectionSettings::unbound(&settings);
        Self {
            parallel: settings.parallel,
            pool_size: 1,
            exclude_hosts: targets.exclude_hosts.clone(),
            settings,
            command: command.to_string(),
            args,
            hosts: vec![],
            targets,
            current_host: None,
            connection,
            connections: ConnectionCache::new(),
        }
    }

    /// Copy of this context for a parallel worker bound to `host`. The
    /// worker starts with its own empty connection cache; open connections
    /// never cross into a worker.
    pub fn snapshot_for(&self, host: &Host) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            command: self.command.clone(),
            args: self.args.clone(),
            hosts: vec![host.clone()],
            exclude_hosts: self.exclude_hosts.clone(),
            targets: self.targets.clone(),
            parallel: false,
            pool_size: 1,
            current_host: None,
            connection: ConnectionSettings::unbound(&self.settings),
            connections: ConnectionCache::new(),
        }
    }

    /// Binds `host` as the current host until the returned scope drops.
    pub fn host_scope(&mut self, host: &Host) -> HostScope<'_> {
        let connection = ConnectionSettings::for_host(host, &self.settings);
        trace!(host = %connection.host_string, "Entering host scope");
        let previous_connection = std::mem::replace(&mut self.connection, connection);
        let previous_host = self.current_host.replace(host.clone());
        HostScope {
            context: self,
            previous_host,
            previous_connection: Some(previous_connection),
        }
    }
}

/// Guard over an `ExecutionContext` with one host bound.
pub struct HostScope<'a> {
    context: &'a mut ExecutionContext,
    previous_host: Option<Host>,
    previous_connection: Option<ConnectionSettings>,
}

impl Deref for HostScope<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for HostScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for HostScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous_connection.take() {
            trace!(host = %self.context.connection.host_string, "Leaving host scope");
            self.context.connection = previous;
        }
        self.context.current_host = self.previous_host.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        let settings = Settings {
            user: "admin".to_string(),
            port: 22,
            ..Settings::default()
        };
        ExecutionContext::new(Arc::new(settings), "server start", vec![], Targets::default())
    }

    #[test]
    fn test_scope_restores_on_drop() {
        let mut ctx = context();
        let before = ctx.connection.clone();
        {
            let scope = ctx.host_scope(&"presto@w1:2222".parse().unwrap());
            assert_eq!(scope.connection.host_string, "presto@w1:2222");
            assert_eq!(scope.connection.user, "presto");
            assert_eq!(scope.connection.port, 2222);
            assert_eq!(scope.current_host.as_ref().unwrap().hostname, "w1");
        }
        assert_eq!(ctx.connection, before);
        assert!(ctx.current_host.is_none());
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut ctx = context();
        let mut outer = ctx.host_scope(&Host::new("a"));
        {
            let inner = outer.host_scope(&Host::new("b"));
            assert_eq!(inner.connection.host_string, "b");
        }
        assert_eq!(outer.connection.host_string, "a");
        assert_eq!(outer.current_host, Some(Host::new("a")));
        drop(outer);
        assert_eq!(ctx.connection.host_string, "");
    }

    #[test]
    fn test_scope_restores_on_panic() {
        let mut ctx = context();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = ctx.host_scope(&Host::new("a"));
            panic!("task blew up");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.connection.host_string, "");
        assert!(ctx.current_host.is_none());
    }

    #[test]
    fn test_snapshot_gets_fresh_cache() {
        let ctx = context();
        let snapshot = ctx.snapshot_for(&Host::new("w2"));
        assert!(snapshot.connections.is_empty());
        assert_eq!(snapshot.hosts, vec![Host::new("w2")]);
        assert_eq!(snapshot.command, "server start");
        assert!(!snapshot.parallel);
    }
}
