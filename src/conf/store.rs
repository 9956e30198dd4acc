//! Local configuration directory.
//!
//! ```text
//! <config-dir>/
//!   topology.yaml
//!   coordinator/{node.properties, jvm.config, config.properties, log.properties}
//!   workers/{...same files...}
//!   catalog/<name>.properties
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::conf::properties::{JvmConfig, Properties};
use crate::conf::{NodeConfig, CONFIG_PROPERTIES, JVM_CONFIG, LOG_PROPERTIES, NODE_PROPERTIES};
use crate::error::{AdminError, Result};
use crate::host::Role;

const CATALOG_DIR: &str = "catalog";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the overrides for `role`. `All` has none of its own.
    pub fn role_dir(&self, role: Role) -> Option<PathBuf> {
        match role {
            Role::Coordinator => Some(self.root.join("coordinator")),
            Role::Worker => Some(self.root.join("workers")),
            Role::All => None,
        }
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.root.join(CATALOG_DIR)
    }

    /// Reads one file as text. `ConfigFileNotFound` when it doesn't exist.
    pub fn read_text(&self, path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AdminError::ConfigFileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_properties(&self, path: &Path) -> Result<Properties> {
        let text = self.read_text(path)?;
        Properties::parse(&text).map_err(|reason| AdminError::MalformedFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Local overrides for `role`. Files that don't exist are left empty.
    pub fn node_overrides(&self, role: Role) -> Result<NodeConfig> {
        let mut overrides = NodeConfig::default();
        let dir = match self.role_dir(role) {
            Some(dir) => dir,
            None => return Ok(overrides),
        };
        overrides.node = self.optional_properties(&dir.join(NODE_PROPERTIES))?;
        overrides.config = self.optional_properties(&dir.join(CONFIG_PROPERTIES))?;
        overrides.log = self.optional_properties(&dir.join(LOG_PROPERTIES))?;
        overrides.jvm = match self.read_text(&dir.join(JVM_CONFIG)) {
            Ok(text) => JvmConfig::parse(&text),
            Err(AdminError::ConfigFileNotFound(_)) => JvmConfig::default(),
            Err(e) => return Err(e),
        };
        Ok(overrides)
    }

    /// Writes `config` as the overrides for `role`, one file each.
    pub fn save_node_config(&self, role: Role, config: &NodeConfig) -> Result<()> {
        let dir = self
            .role_dir(role)
            .ok_or_else(|| AdminError::config("The 'all' role has no configuration directory"))?;
        fs::create_dir_all(&dir)?;
        for (name, contents) in config.files() {
            fs::write(dir.join(name), contents)?;
        }
        Ok(())
    }

    fn optional_properties(&self, path: &Path) -> Result<Properties> {
        match self.read_properties(path) {
            Ok(props) => Ok(props),
            Err(AdminError::ConfigFileNotFound(_)) => {
                debug!(path = %path.display(), "No local override");
                Ok(Properties::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Names of the local catalogs, sorted.
    pub fn catalog_names(&self) -> Result<Vec<String>> {
        let dir = self.catalog_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AdminError::ConfigFileNotFound(dir))
            }
            Err(e) => return Err(e.into()),
        };
        let mut names = vec![];
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("properties") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads and validates `catalog/<name>.properties`.
    pub fn read_catalog(&self, name: &str) -> Result<Properties> {
        let path = self.catalog_dir().join(format!("{}.properties", name));
        let props = self.read_properties(&path)?;
        if !props.contains("connector.name") {
            return Err(AdminError::config(format!(
                "Catalog configuration {} does not contain connector.name",
                path.display()
            )));
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_vs_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let path = dir.path().join("x.properties");
        assert!(matches!(
            store.read_properties(&path),
            Err(AdminError::ConfigFileNotFound(_))
        ));
        fs::write(&path, "=oops\n").unwrap();
        assert!(matches!(
            store.read_properties(&path),
            Err(AdminError::MalformedFile { .. })
        ));
    }

    #[test]
    fn test_overrides_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert_eq!(
            store.node_overrides(Role::Worker).unwrap(),
            NodeConfig::default()
        );

        let mut config = NodeConfig::default();
        config.node.set("node.environment", "staging");
        config.jvm = JvmConfig(vec!["-Xmx4G".to_string()]);
        store.save_node_config(Role::Worker, &config).unwrap();
        assert!(dir.path().join("workers").join(NODE_PROPERTIES).exists());

        let loaded = store.node_overrides(Role::Worker).unwrap();
        assert_eq!(loaded.node.get("node.environment"), Some("staging"));
        assert_eq!(loaded.jvm.options(), ["-Xmx4G"]);
        assert!(store.node_overrides(Role::Coordinator).unwrap().node.is_empty());
    }

    #[test]
    fn test_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(matches!(
            store.catalog_names(),
            Err(AdminError::ConfigFileNotFound(_))
        ));
        let catalogs = dir.path().join("catalog");
        fs::create_dir_all(&catalogs).unwrap();
        fs::write(catalogs.join("tpch.properties"), "connector.name=tpch\n").unwrap();
        fs::write(catalogs.join("bad.properties"), "foo=bar\n").unwrap();
        fs::write(catalogs.join("README"), "not a catalog\n").unwrap();

        assert_eq!(store.catalog_names().unwrap(), vec!["bad", "tpch"]);
        assert_eq!(
            store.read_catalog("tpch").unwrap().get("connector.name"),
            Some("tpch")
        );
        assert!(store.read_catalog("bad").is_err());
    }
}
