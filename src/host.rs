//! Cluster hosts and roles.
//!
//! A `Host` is identified by its host string (`hostname`, `ip`, or
//! `user@host:port`). Every host belongs to one or more roles, and each role
//! keeps its hosts in insertion order with no duplicates.

use std::fmt;
use std::str::FromStr;

use colored::*;
use colourado::Color;
use itertools::Itertools;

use crate::error::AdminError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    /// SSH hostname or address.
    pub hostname: String,
    /// Login user, when given in the host string.
    pub user: Option<String>,
    /// SSH port, when given in the host string.
    pub port: Option<u16>,
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            user: None,
            port: None,
        }
    }

    /// The host string this host is keyed by.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Surrounds the host string with brackets, as used for output prefixes.
    pub fn prefix(&self) -> String {
        format!("[{}]", self)
    }

    /// For pretty-printing the host name.
    /// Surrounds with brackets and colors it with the given palette color.
    pub fn prettify(&self, color: &Color) -> ColoredString {
        let r = (color.red * 255.0) as u8;
        let g = (color.green * 255.0) as u8;
        let b = (color.blue * 255.0) as u8;
        self.prefix().truecolor(r, g, b)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        match self.port {
            Some(port) if self.hostname.contains(':') => write!(f, "[{}]:{}", self.hostname, port),
            Some(port) => write!(f, "{}:{}", self.hostname, port),
            None => write!(f, "{}", self.hostname),
        }
    }
}

impl FromStr for Host {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };
        let parse_port = |port: &str| {
            port.parse::<u16>()
                .map_err(|_| AdminError::config(format!("Invalid port in host '{}'", s)))
        };
        let (hostname, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // `[fe80::1]` or `[fe80::1]:2222`
            let (address, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| AdminError::config(format!("Unclosed '[' in host '{}'", s)))?;
            match tail {
                "" => (address, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (address, Some(parse_port(port)?)),
                    None => return Err(AdminError::config(format!("Invalid host '{}'", s))),
                },
            }
        } else if rest.matches(':').count() > 1 {
            // A bare IPv6 address carries no port.
            (rest, None)
        } else {
            match rest.split_once(':') {
                Some((hostname, port)) => (hostname, Some(parse_port(port)?)),
                None => (rest, None),
            }
        };
        if hostname.is_empty() || hostname.contains(char::is_whitespace) {
            return Err(AdminError::config(format!("Invalid host '{}'", s)));
        }
        if matches!(&user, Some(u) if u.is_empty()) {
            return Err(AdminError::config(format!("Empty user in host '{}'", s)));
        }
        Ok(Self {
            hostname: hostname.to_string(),
            user,
            port,
        })
    }
}

/// A named group of hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Coordinator,
    Worker,
    All,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::Coordinator => "coordinator",
            Role::Worker => "worker",
            Role::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coordinator" => Ok(Role::Coordinator),
            "worker" | "workers" => Ok(Role::Worker),
            "all" => Ok(Role::All),
            other => Err(AdminError::config(format!("Unknown role '{}'", other))),
        }
    }
}

/// Role name to ordered host list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    coordinator: Vec<Host>,
    worker: Vec<Host>,
    all: Vec<Host>,
}

impl RoleTable {
    pub fn new(coordinator: Vec<Host>, workers: Vec<Host>) -> Self {
        let coordinator: Vec<Host> = coordinator.into_iter().unique().collect();
        let worker: Vec<Host> = workers.into_iter().unique().collect();
        let all = coordinator.iter().chain(worker.iter()).cloned().unique().collect();
        Self {
            coordinator,
            worker,
            all,
        }
    }

    pub fn hosts(&self, role: Role) -> &[Host] {
        match role {
            Role::Coordinator => &self.coordinator,
            Role::Worker => &self.worker,
            Role::All => &self.all,
        }
    }

    pub fn has_role(&self, host: &Host, role: Role) -> bool {
        self.hosts(role).contains(host)
    }

    /// Looks up a host string in the topology, matching either the full
    /// host string or the bare hostname.
    pub fn find(&self, host: &str) -> Option<&Host> {
        self.all
            .iter()
            .find(|h| h.key() == host || h.hostname == host)
    }

    /// The first coordinator, which every worker points its discovery at.
    pub fn coordinator(&self) -> Option<&Host> {
        self.coordinator.first()
    }
}
