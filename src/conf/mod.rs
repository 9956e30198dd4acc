//! Presto node configuration.
//!
//! A node's configuration is four files under `/etc/presto`. The desired
//! state for a host starts from its role's defaults, takes the local
//! overrides on top, and has its placeholders rendered for that host.
//! `node.id` is the one value that must survive redeploys; see
//! [`NodeConfig::assign_node_id`].

pub mod properties;
pub mod render;
pub mod store;

pub use properties::{JvmConfig, Properties};
pub use render::{Renderer, TemplateVars};
pub use store::ConfigStore;

use tracing::debug;
use uuid::Uuid;

use crate::error::{AdminError, Result};
use crate::host::{Host, Role, RoleTable};

pub const NODE_PROPERTIES: &str = "node.properties";
pub const JVM_CONFIG: &str = "jvm.config";
pub const CONFIG_PROPERTIES: &str = "config.properties";
pub const LOG_PROPERTIES: &str = "log.properties";

pub const DEFAULT_HTTP_PORT: &str = "8080";

const REQUIRED_NODE_KEYS: [&str; 2] = ["node.environment", "node.data-dir"];
const REQUIRED_CONFIG_KEYS: [&str; 3] = ["coordinator", "http-server.http.port", "discovery.uri"];

/// Where a node's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIdSource {
    Local,
    Remote,
    Generated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub node: Properties,
    pub jvm: JvmConfig,
    pub config: Properties,
    pub log: Properties,
}

impl NodeConfig {
    /// Defaults for a coordinator (which also schedules work on itself
    /// when `include_coordinator`) or for a worker.
    pub fn defaults(coordinator: bool, include_coordinator: bool) -> Self {
        let node = [
            ("node.environment", "presto"),
            ("node.data-dir", "/var/lib/presto/data"),
            ("plugin.config-dir", "/etc/presto/catalog"),
            ("plugin.dir", "/usr/lib/presto/lib/plugin"),
        ]
        .into_iter()
        .collect();

        let jvm = JvmConfig(
            [
                "-server",
                "-Xmx16G",
                "-XX:-UseBiasedLocking",
                "-XX:+UseG1GC",
                "-XX:G1HeapRegionSize=32M",
                "-XX:+ExplicitGCInvokesConcurrent",
                "-XX:+HeapDumpOnOutOfMemoryError",
                "-XX:+UseGCOverheadLimit",
                "-XX:+ExitOnOutOfMemoryError",
                "-XX:ReservedCodeCacheSize=512M",
                "-DHADOOP_USER_NAME=hive",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );

        let mut config = Properties::new();
        config.set("coordinator", coordinator.to_string());
        if coordinator {
            config.set("discovery-server.enabled", "true");
        }
        config.set("discovery.uri", "http://{{coordinator}}:{{http_port}}");
        config.set("http-server.http.port", DEFAULT_HTTP_PORT);
        if coordinator {
            config.set(
                "node-scheduler.include-coordinator",
                include_coordinator.to_string(),
            );
        }
        config.set("query.max-memory", "50GB");
        config.set("query.max-memory-per-node", "8GB");

        let log = [("com.facebook.presto", "INFO")].into_iter().collect();

        Self {
            node,
            jvm,
            config,
            log,
        }
    }

    /// Overlays `other` file by file. Properties merge key by key; a
    /// non-empty `jvm.config` replaces the whole option list.
    pub fn overlay(&mut self, other: &NodeConfig) {
        self.node.merge(&other.node);
        self.config.merge(&other.config);
        self.log.merge(&other.log);
        if !other.jvm.options().is_empty() {
            self.jvm = other.jvm.clone();
        }
    }

    /// Variables for rendering this configuration on `hostname`.
    pub fn template_vars(&self, hostname: &str, coordinator: &str) -> TemplateVars {
        TemplateVars {
            hostname: hostname.to_string(),
            coordinator: coordinator.to_string(),
            http_port: self
                .config
                .get("http-server.http.port")
                .unwrap_or(DEFAULT_HTTP_PORT)
                .to_string(),
            node_environment: self
                .node
                .get("node.environment")
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn render(&self, renderer: &Renderer, vars: &TemplateVars) -> Result<Self> {
        let render = |value: &str| renderer.render(value, vars);
        Ok(Self {
            node: self.node.try_map_values(render)?,
            config: self.config.try_map_values(render)?,
            log: self.log.try_map_values(render)?,
            jvm: JvmConfig(
                self.jvm
                    .options()
                    .iter()
                    .map(|option| renderer.render(option, vars))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Settles `node.id`: the local override if there is one, else the id
    /// already deployed on the host, else a fresh one.
    pub fn assign_node_id(&mut self, remote: Option<&Properties>) -> NodeIdSource {
        if self.node.get("node.id").map_or(false, |id| !id.is_empty()) {
            return NodeIdSource::Local;
        }
        match remote.and_then(|props| props.get("node.id")).filter(|id| !id.is_empty()) {
            Some(id) => {
                self.node.set("node.id", id);
                NodeIdSource::Remote
            }
            None => {
                self.node.set("node.id", Uuid::new_v4().to_string());
                NodeIdSource::Generated
            }
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node.get("node.id")
    }

    /// Checks the keys Presto refuses to start without.
    pub fn validate(&self, is_coordinator: bool) -> Result<()> {
        for key in REQUIRED_NODE_KEYS {
            if self.node.get(key).map_or(true, str::is_empty) {
                return Err(AdminError::config(format!(
                    "{} is missing required key {}",
                    NODE_PROPERTIES, key
                )));
            }
        }
        for key in REQUIRED_CONFIG_KEYS {
            if self.config.get(key).map_or(true, str::is_empty) {
                return Err(AdminError::config(format!(
                    "{} is missing required key {}",
                    CONFIG_PROPERTIES, key
                )));
            }
        }
        if let Some(port) = self.config.get("http-server.http.port") {
            if port.parse::<u16>().is_err() {
                return Err(AdminError::config(format!(
                    "http-server.http.port must be a port number, got '{}'",
                    port
                )));
            }
        }
        match (self.config.get("coordinator"), is_coordinator) {
            (Some("true"), true) | (Some("false"), false) => Ok(()),
            (Some("true"), false) => Err(AdminError::config(
                "coordinator=true is only allowed on the coordinator",
            )),
            (value, _) => Err(AdminError::config(format!(
                "Expected coordinator={} but found {}",
                is_coordinator,
                value.unwrap_or("nothing")
            ))),
        }
    }

    /// File name and contents of every file, in deploy order.
    pub fn files(&self) -> Vec<(&'static str, String)> {
        vec![
            (NODE_PROPERTIES, self.node.to_string()),
            (JVM_CONFIG, self.jvm.to_string()),
            (CONFIG_PROPERTIES, self.config.to_string()),
            (LOG_PROPERTIES, self.log.to_string()),
        ]
    }
}

/// Steps 1 to 3 of a deploy: role defaults, local overrides, placeholders.
/// A host in both roles gets the coordinator's configuration and also runs
/// queries.
pub fn desired_config(
    store: &ConfigStore,
    roles: &RoleTable,
    host: &Host,
    renderer: &Renderer,
) -> Result<NodeConfig> {
    let is_coordinator = roles.has_role(host, Role::Coordinator);
    let is_worker = roles.has_role(host, Role::Worker);
    let role = if is_coordinator {
        Role::Coordinator
    } else {
        Role::Worker
    };

    let mut config = NodeConfig::defaults(is_coordinator, is_coordinator && is_worker);
    config.overlay(&store.node_overrides(role)?);

    let coordinator = roles
        .coordinator()
        .map(|c| c.hostname.clone())
        .ok_or_else(|| AdminError::config("The topology has no coordinator"))?;
    let vars = config.template_vars(&host.hostname, &coordinator);
    debug!(host = %host, role = %role, "Rendering node configuration");
    config.render(renderer, &vars)
}
