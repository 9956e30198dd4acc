//! Configuration for presto-admin.
//!
//! `Config` holds the clap structs for global command line flags. `Settings`
//! is the runtime environment every task runs under, built from defaults,
//! the topology file, `--set` pairs, and finally the specific flags.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{AdminError, Result};
use crate::topology::{DEFAULT_PORT, DEFAULT_USER};

pub const DEFAULT_CONFIG_DIR: &str = ".prestoadmin";

#[derive(Parser, Debug, Default)]
#[command(
    name = "presto-admin",
    version,
    about = "Install, configure, and operate a Presto cluster over SSH"
)]
pub struct Config {
    /// Comma-separated hosts to run on, instead of the task's default roles
    #[arg(long, short = 'H', value_delimiter = ',', value_parser = host_name)]
    pub hosts: Vec<String>,

    /// Comma-separated hosts to leave out
    #[arg(long, short = 'x', value_delimiter = ',', value_parser = host_name)]
    pub exclude_hosts: Vec<String>,

    /// Run on one host at a time, even for parallel tasks
    #[arg(long)]
    pub serial: bool,

    /// Comma-separated key=value environment overrides
    #[arg(long, value_name = "KEY=VALUE,...")]
    pub set: Option<String>,

    /// Prompt for the sudo password before running
    #[arg(short = 'I', long = "initial-password-prompt")]
    pub initial_password_prompt: bool,

    /// SSH user, overriding the topology
    #[arg(long, short)]
    pub user: Option<String>,

    /// SSH port, overriding the topology
    #[arg(long)]
    pub port: Option<u16>,

    /// Private key file for SSH
    #[arg(long, short = 'i')]
    pub key_filename: Option<PathBuf>,

    /// Warn about unreachable hosts and keep going
    #[arg(long)]
    pub skip_bad_hosts: bool,

    /// Warn about any per-host failure and keep going
    #[arg(long)]
    pub warn_only: bool,

    /// Maximum number of hosts to run on at once
    #[arg(long, short = 'z')]
    pub pool_size: Option<usize>,

    /// SSH connect timeout in seconds
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,

    /// Directory holding the topology, node configuration, and catalogs
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase console log verbosity (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Command path followed by task arguments, e.g. `server start`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// One item of a comma-separated host list, without surrounding blanks.
fn host_name(item: &str) -> std::result::Result<String, String> {
    let host = item.trim();
    if host.is_empty() {
        return Err("empty host name in list".to_string());
    }
    Ok(host.to_string())
}

/// The environment every task runs under.
#[derive(Debug, Clone)]
pub struct Settings {
    pub user: String,
    pub port: u16,
    pub key_filename: Option<PathBuf>,
    /// Sudo password, from `-I`.
    pub password: Option<String>,
    pub skip_bad_hosts: bool,
    pub warn_only: bool,
    pub skip_unknown_tasks: bool,
    /// Whether parallel tasks may run in parallel at all.
    pub parallel: bool,
    /// Upper bound on concurrently running hosts; `None` means one per host.
    pub pool_size: Option<usize>,
    pub eagerly_disconnect: bool,
    pub connect_timeout: Duration,
    /// Per-host limit for parallel jobs. `None` waits forever.
    pub job_timeout: Option<Duration>,
    /// Prefix remote output lines with the host.
    pub output_prefix: bool,
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
    /// `--set` keys with no dedicated field.
    pub extra: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let config_dir = default_config_dir();
        Self {
            user: DEFAULT_USER.to_string(),
            port: DEFAULT_PORT,
            key_filename: None,
            password: None,
            skip_bad_hosts: false,
            warn_only: false,
            skip_unknown_tasks: false,
            parallel: true,
            pool_size: None,
            eagerly_disconnect: false,
            connect_timeout: Duration::from_secs(10),
            job_timeout: None,
            output_prefix: true,
            log_dir: config_dir.join("log"),
            config_dir,
            extra: BTreeMap::new(),
        }
    }
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_DIR)
}

impl Settings {
    /// Applies one `key=value` override.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || AdminError::config(format!("Invalid value '{}' for '{}'", value, key));
        let flag = || parse_bool(value).ok_or_else(invalid);
        match key {
            "user" => self.user = value.to_string(),
            "port" => self.port = value.parse().map_err(|_| invalid())?,
            "key_filename" => self.key_filename = Some(PathBuf::from(value)),
            "password" => self.password = Some(value.to_string()),
            "skip_bad_hosts" => self.skip_bad_hosts = flag()?,
            "warn_only" => self.warn_only = flag()?,
            "skip_unknown_tasks" => self.skip_unknown_tasks = flag()?,
            "parallel" => self.parallel = flag()?,
            "serial" => self.parallel = !flag()?,
            "pool_size" => {
                let size: usize = value.parse().map_err(|_| invalid())?;
                if size == 0 {
                    return Err(invalid());
                }
                self.pool_size = Some(size);
            }
            "eagerly_disconnect" => self.eagerly_disconnect = flag()?,
            "timeout" | "connect_timeout" => {
                self.connect_timeout = Duration::from_secs(value.parse().map_err(|_| invalid())?)
            }
            "job_timeout" => {
                self.job_timeout = Some(Duration::from_secs(value.parse().map_err(|_| invalid())?))
            }
            "output_prefix" => self.output_prefix = flag()?,
            "config_dir" => self.config_dir = PathBuf::from(value),
            "log_dir" => self.log_dir = PathBuf::from(value),
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Applies a `--set` argument: `key=value` pairs separated by commas.
    /// A bare `key` sets it to `true`.
    pub fn apply_set_pairs(&mut self, pairs: &str) -> Result<()> {
        for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => self.set(key.trim(), value.trim())?,
                None => self.set(pair, "true")?,
            }
        }
        Ok(())
    }

    /// Builds the settings for a run: defaults, then `base` pairs (the
    /// topology), then `--set`, then the dedicated flags.
    pub fn from_config(cli: &Config, base: &BTreeMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(dir) = &cli.config_dir {
            settings.config_dir = dir.clone();
            settings.log_dir = dir.join("log");
        }
        for (key, value) in base {
            settings.set(key, value)?;
        }
        if let Some(pairs) = &cli.set {
            settings.apply_set_pairs(pairs)?;
        }
        if let Some(user) = &cli.user {
            settings.user = user.clone();
        }
        if let Some(port) = cli.port {
            settings.port = port;
        }
        if let Some(key) = &cli.key_filename {
            settings.key_filename = Some(key.clone());
        }
        if cli.skip_bad_hosts {
            settings.skip_bad_hosts = true;
        }
        if cli.warn_only {
            settings.warn_only = true;
        }
        if cli.serial {
            settings.parallel = false;
        }
        if let Some(size) = cli.pool_size {
            if size == 0 {
                return Err(AdminError::config("--pool-size must be at least 1"));
            }
            settings.pool_size = Some(size);
        }
        if let Some(timeout) = cli.timeout {
            settings.connect_timeout = Duration::from_secs(timeout);
        }
        Ok(settings)
    }

    pub fn topology_path(&self) -> PathBuf {
        self.config_dir.join("topology.yaml")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
