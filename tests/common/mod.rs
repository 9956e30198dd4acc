//! In-memory cluster for driving the executor and the commands without SSH.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use presto_admin::session::ConnectionSettings;
use presto_admin::{
    AdminError, Connector, Executor, Host, Output, Registry, Result, RoleTable, Settings,
    Transport,
};

#[derive(Default)]
struct State {
    /// host -> remote path -> contents
    files: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    /// (host, command) in the order they ran
    commands: Vec<(String, String)>,
    connects: Vec<String>,
    closes: Vec<String>,
    unreachable: HashSet<String>,
    /// (host, substring) of commands that exit 1
    failing: Vec<(String, String)>,
}

#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<State>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(&self, host: &str) {
        self.state.lock().unwrap().unreachable.insert(host.to_string());
    }

    /// Any command on `host` containing `needle` exits 1.
    pub fn fail_command(&self, host: &str, needle: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .push((host.to_string(), needle.to_string()));
    }

    pub fn put_file(&self, host: &str, path: &str, contents: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .entry(host.to_string())
            .or_default()
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }

    pub fn file(&self, host: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(host)
            .and_then(|files| files.get(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn commands_on(&self, host: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn closes(&self) -> Vec<String> {
        self.state.lock().unwrap().closes.clone()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            state: Arc::clone(&self.state),
        })
    }
}

struct MockConnector {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(target.host_string.clone());
        if state.unreachable.contains(&target.host_string) {
            return Err(AdminError::network(&target.host_string, "Connection refused"));
        }
        Ok(Arc::new(MockTransport {
            host: target.host_string.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTransport {
    host: String,
    state: Arc<Mutex<State>>,
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('\'').to_string()
}

impl MockTransport {
    fn exec(&self, command: &str) -> Output {
        let mut state = self.state.lock().unwrap();
        state.commands.push((self.host.clone(), command.to_string()));
        let failed = state
            .failing
            .iter()
            .any(|(host, needle)| *host == self.host && command.contains(needle.as_str()));
        if failed {
            return Output {
                code: Some(1),
                stdout: String::new(),
                stderr: "scripted failure".to_string(),
            };
        }

        let files = state.files.entry(self.host.clone()).or_default();
        let code = if let Some(path) = command.strip_prefix("test -f ") {
            if files.contains_key(&unquote(path)) {
                0
            } else {
                1
            }
        } else if let Some(path) = command.strip_prefix("rm -f ") {
            files.remove(&unquote(path));
            0
        } else {
            0
        };
        let stdout = if command.starts_with("rpm -q") {
            "0.1.0".to_string()
        } else {
            format!("ran: {}", command)
        };
        Output {
            code: Some(code),
            stdout,
            stderr: String::new(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn run(&self, command: &str) -> Result<Output> {
        Ok(self.exec(command))
    }

    async fn sudo(&self, command: &str) -> Result<Output> {
        Ok(self.exec(command))
    }

    async fn upload(&self, contents: &[u8], path: &str, _use_sudo: bool) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .files
            .entry(self.host.clone())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .get(&self.host)
            .and_then(|files| files.get(path))
            .cloned())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closes.push(self.host.clone());
    }
}

/// Settings rooted in a scratch directory.
pub fn settings(dir: &Path) -> Settings {
    Settings {
        config_dir: dir.to_path_buf(),
        log_dir: dir.join("log"),
        ..Settings::default()
    }
}

/// `master` coordinates; `a`, `b` and `c` are workers.
pub fn roles() -> RoleTable {
    RoleTable::new(
        vec![Host::new("master")],
        ["a", "b", "c"].iter().map(|h| Host::new(*h)).collect(),
    )
}

pub fn executor(settings: Settings, registry: Registry, cluster: &MockCluster) -> Executor {
    Executor::new(settings, roles(), registry, cluster.connector())
}
