//! Cluster topology file.
//!
//! The topology names the coordinator and the workers, plus the SSH user and
//! port used when a host entry doesn't carry its own. It is read once at
//! startup and turned into the `RoleTable` every task dispatches against.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use dialoguer::Input;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};
use void::Void;

use crate::error::{AdminError, Result};
use crate::host::{Host, RoleTable};
use crate::serde::host_or_mapping;

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_HOST: &str = "localhost";

/// One host entry: a bare string or a mapping with per-host overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostEntry {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl FromStr for HostEntry {
    type Err = Void;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self {
            host: s.to_string(),
            user: None,
            port: None,
        })
    }
}

impl Serialize for HostEntry {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.user.is_none() && self.port.is_none() {
            // A plain entry is written back as a bare string.
            self.host.serialize(serializer)
        } else {
            let mut map = serializer.serialize_map(None)?;
            map.serialize_entry("host", &self.host)?;
            if let Some(user) = &self.user {
                map.serialize_entry("user", user)?;
            }
            if let Some(port) = &self.port {
                map.serialize_entry("port", port)?;
            }
            map.end()
        }
    }
}

impl HostEntry {
    fn to_host(&self) -> Result<Host> {
        let mut host: Host = self.host.parse()?;
        if self.user.is_some() {
            host.user = self.user.clone();
        }
        if self.port.is_some() {
            host.port = self.port;
        }
        Ok(host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
struct HostSpec(#[serde(deserialize_with = "host_or_mapping")] HostEntry);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Topology {
    #[serde(default = "default_user")]
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_coordinator")]
    coordinator: HostSpec,
    #[serde(default = "default_workers")]
    workers: Vec<HostSpec>,
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_coordinator() -> HostSpec {
    HostSpec(HostEntry::from_str(DEFAULT_HOST).unwrap_or_else(|v| void::unreachable(v)))
}

fn default_workers() -> Vec<HostSpec> {
    vec![default_coordinator()]
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            username: default_user(),
            port: default_port(),
            coordinator: default_coordinator(),
            workers: default_workers(),
        }
    }
}

impl Topology {
    pub fn new(username: String, port: u16, coordinator: HostEntry, workers: Vec<HostEntry>) -> Self {
        Self {
            username,
            port,
            coordinator: HostSpec(coordinator),
            workers: workers.into_iter().map(HostSpec).collect(),
        }
    }

    pub fn coordinator(&self) -> &HostEntry {
        &self.coordinator.0
    }

    pub fn workers(&self) -> impl Iterator<Item = &HostEntry> {
        self.workers.iter().map(|spec| &spec.0)
    }

    /// Reads and validates the topology file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AdminError::ConfigFileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let topology: Topology =
            serde_yaml::from_str(&content).map_err(|source| AdminError::MalformedConfig {
                path: path.to_path_buf(),
                source,
            })?;
        topology.validate()?;
        debug!(path = %path.display(), "Loaded topology");
        Ok(topology)
    }

    /// Reads the topology file, asking the user for one when it doesn't
    /// exist yet and `interactive` is set. A prompted topology is saved.
    pub fn load_or_prompt(path: &Path, interactive: bool) -> Result<Self> {
        match Self::load(path) {
            Err(AdminError::ConfigFileNotFound(_)) if interactive => {
                eprintln!(
                    "[presto-admin] No topology at {}. Enter the cluster layout.",
                    path.display()
                );
                let topology = Self::prompt()?;
                topology.save(path)?;
                Ok(topology)
            }
            other => other,
        }
    }

    fn prompt() -> Result<Self> {
        let prompt_err = |e: dialoguer::Error| AdminError::config(format!("Prompt failed: {}", e));
        let username: String = Input::new()
            .with_prompt("SSH username")
            .default(DEFAULT_USER.to_string())
            .interact_text()
            .map_err(prompt_err)?;
        let port: u16 = Input::new()
            .with_prompt("SSH port")
            .default(DEFAULT_PORT)
            .interact_text()
            .map_err(prompt_err)?;
        let coordinator: String = Input::new()
            .with_prompt("Coordinator host")
            .default(DEFAULT_HOST.to_string())
            .interact_text()
            .map_err(prompt_err)?;
        let workers: String = Input::new()
            .with_prompt("Worker hosts (comma-separated)")
            .default(DEFAULT_HOST.to_string())
            .interact_text()
            .map_err(prompt_err)?;

        let entry = |s: &str| HostEntry::from_str(s.trim()).unwrap_or_else(|v| void::unreachable(v));
        let topology = Self::new(
            username,
            port,
            entry(&coordinator),
            workers
                .split(',')
                .filter(|w| !w.trim().is_empty())
                .map(entry)
                .collect(),
        );
        topology.validate()?;
        Ok(topology)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)
            .map_err(|e| AdminError::config(format!("Failed to serialize topology: {}", e)))?;
        fs::write(path, content)?;
        info!(path = %path.display(), "Saved topology");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(AdminError::config("Topology username must not be empty"));
        }
        if self.port == 0 {
            return Err(AdminError::config("Topology port must be between 1 and 65535"));
        }
        if self.workers.is_empty() {
            return Err(AdminError::config("Topology must list at least one worker"));
        }
        self.role_table().map(|_| ())
    }

    pub fn role_table(&self) -> Result<RoleTable> {
        let coordinator = self.coordinator().to_host()?;
        let workers = self
            .workers()
            .map(HostEntry::to_host)
            .collect::<Result<Vec<_>>>()?;
        Ok(RoleTable::new(vec![coordinator], workers))
    }

    /// Topology fields as `--set` style pairs, applied under user overrides.
    pub fn settings_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = BTreeMap::new();
        pairs.insert("user".to_string(), self.username.clone());
        pairs.insert("port".to_string(), self.port.to_string());
        pairs
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AdminError::config(format!("Failed to serialize topology: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Role;

    #[test]
    fn test_parse_mixed_host_entries() {
        let yaml = r#"
username: presto
port: 2200
coordinator: master
workers:
  - slave1
  - host: slave2
    port: 2222
  - slave1
"#;
        let topology: Topology = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(topology.username, "presto");
        assert_eq!(topology.port, 2200);
        assert_eq!(topology.coordinator().host, "master");
        let workers: Vec<_> = topology.workers().cloned().collect();
        assert_eq!(workers[1].port, Some(2222));

        let table = topology.role_table().unwrap();
        let keys: Vec<_> = table.hosts(Role::All).iter().map(Host::key).collect();
        assert_eq!(keys, vec!["master", "slave1", "slave2:2222"]);
    }

    #[test]
    fn test_json_topology_is_accepted() {
        let json = r#"{"username": "root", "coordinator": "a", "workers": ["b", "c"]}"#;
        let topology: Topology = serde_yaml::from_str(json).unwrap();
        assert_eq!(topology.port, DEFAULT_PORT);
        assert_eq!(topology.workers().count(), 2);
    }

    #[test]
    fn test_blank_host_entry_is_rejected() {
        assert!(serde_yaml::from_str::<Topology>("coordinator: ''\n").is_err());
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let topology: Topology = serde_yaml::from_str("port: 22").unwrap();
        assert_eq!(topology, Topology::default());
    }

    #[test]
    fn test_load_distinguishes_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.yaml");
        assert!(matches!(
            Topology::load(&path),
            Err(AdminError::ConfigFileNotFound(_))
        ));

        fs::write(&path, "workers: [a, b\n").unwrap();
        assert!(matches!(
            Topology::load(&path),
            Err(AdminError::MalformedConfig { .. })
        ));

        fs::write(&path, "workers: []\n").unwrap();
        assert!(matches!(
            Topology::load(&path),
            Err(AdminError::Configuration(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("topology.yaml");
        let entry = |h: &str| HostEntry::from_str(h).unwrap();
        let topology = Topology::new(
            "admin".to_string(),
            22,
            entry("coord"),
            vec![
                entry("w1"),
                HostEntry {
                    host: "w2".to_string(),
                    user: Some("presto".to_string()),
                    port: None,
                },
            ],
        );
        topology.save(&path).unwrap();
        assert_eq!(Topology::load(&path).unwrap(), topology);
    }
}
