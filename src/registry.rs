use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{ValidationError, ValidationErrors};
use crate::models::Connection;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Read-only snapshot of the known connections and named groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Group name -> ordered member ids.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

fn default_version() -> u32 {
    REGISTRY_VERSION
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            defaults: Defaults::default(),
            connections: Vec::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl Registry {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections,
            ..Default::default()
        }
    }

    pub fn with_group<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Fill per-connection user and port from the registry defaults.
    pub fn apply_defaults(&mut self) {
        let port = self.defaults.port.unwrap_or(DEFAULT_SSH_PORT);
        self.defaults.port = Some(port);

        for conn in &mut self.connections {
            if conn.user.as_deref().map_or(true, str::is_empty) {
                conn.user = self.defaults.user.clone();
            }
            if conn.port.map_or(true, |p| p == 0) {
                conn.port = Some(port);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errs = Vec::new();

        if self.version != REGISTRY_VERSION {
            errs.push(ValidationError::new("version", "must be 1"));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (i, conn) in self.connections.iter().enumerate() {
            let prefix = format!("connections[{i}]");

            if conn.id.is_empty() {
                errs.push(ValidationError::new(format!("{prefix}.id"), "is required"));
            } else if !seen.insert(conn.id.as_str()) {
                errs.push(ValidationError::new(
                    format!("{prefix}.id"),
                    format!("duplicate id '{}'", conn.id),
                ));
            }

            if conn.host.is_empty() {
                errs.push(ValidationError::new(format!("{prefix}.host"), "is required"));
            }
        }

        for (name, members) in &self.groups {
            for member in members {
                if !seen.contains(member.as_str()) {
                    errs.push(ValidationError::new(
                        format!("groups.{name}"),
                        format!("references unknown connection '{member}'"),
                    ));
                }
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errs))
        }
    }
}
