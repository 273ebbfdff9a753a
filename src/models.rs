use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single SSH destination as stored in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_jump: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forward_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    // Sorted so the generated `-o` flags come out in a stable order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Connection {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_project_env(mut self, project: impl Into<String>, env: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self.env = Some(env.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn project(&self) -> &str {
        self.project.as_deref().unwrap_or_default()
    }

    pub fn env(&self) -> &str {
        self.env.as_deref().unwrap_or_default()
    }

    /// The login user, falling back to `$USER` when the connection has none.
    pub fn effective_user(&self) -> Option<String> {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => Some(user.to_string()),
            _ => std::env::var("USER").ok().filter(|u| !u.is_empty()),
        }
    }
}
