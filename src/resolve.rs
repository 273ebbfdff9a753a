//! Turns a target expression into the list of connections it names.
//!
//! Strategies are tried in a fixed order and the first one that applies wins:
//! named group, project-env pattern, glob, then fuzzy best match.

use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::ResolveError;
use crate::fuzzy;
use crate::models::Connection;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    NamedGroup,
    ProjectEnv,
    Glob,
    Fuzzy,
    None,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NamedGroup => "named group",
            Self::ProjectEnv => "project-env pattern",
            Self::Glob => "glob pattern",
            Self::Fuzzy => "fuzzy match",
            Self::None => "none",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveResult {
    pub connections: Vec<Connection>,
    pub method: MatchMethod,
}

impl ResolveResult {
    fn new(connections: Vec<Connection>, method: MatchMethod) -> Self {
        Self {
            connections,
            method,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

pub fn resolve_target(target: &str, registry: &Registry) -> Result<ResolveResult, ResolveError> {
    if let Some(members) = registry.group(target) {
        let connections = group_members(members, &registry.connections);
        tracing::debug!(expression = target, hosts = connections.len(), "resolved as named group");
        return Ok(ResolveResult::new(connections, MatchMethod::NamedGroup));
    }

    let matches = match_project_env(target, &registry.connections);
    if !matches.is_empty() {
        tracing::debug!(expression = target, hosts = matches.len(), "resolved as project-env pattern");
        return Ok(ResolveResult::new(matches, MatchMethod::ProjectEnv));
    }

    if is_glob(target) {
        let re = compile_glob(target)?;
        let connections: Vec<Connection> = registry
            .connections
            .iter()
            .filter(|conn| re.is_match(&conn.id))
            .cloned()
            .collect();
        tracing::debug!(expression = target, hosts = connections.len(), "resolved as glob pattern");
        return Ok(ResolveResult::new(connections, MatchMethod::Glob));
    }

    if let Some(conn) = fuzzy::find_best_match(target, &registry.connections) {
        tracing::debug!(expression = target, id = %conn.id, "resolved as fuzzy match");
        return Ok(ResolveResult::new(vec![conn.clone()], MatchMethod::Fuzzy));
    }

    tracing::debug!(expression = target, "no connection matched");
    Ok(ResolveResult::new(Vec::new(), MatchMethod::None))
}

/// Members in group order; ids missing from the registry are skipped.
fn group_members(members: &[String], connections: &[Connection]) -> Vec<Connection> {
    members
        .iter()
        .filter_map(|id| fuzzy::find_by_id(id, connections))
        .cloned()
        .collect()
}

/// `project-env`, `project` or `env` style targets, case-insensitive.
pub fn match_project_env(target: &str, connections: &[Connection]) -> Vec<Connection> {
    let target = target.to_lowercase();

    connections
        .iter()
        .filter(|conn| {
            let project_env = format!("{}-{}", conn.project(), conn.env()).to_lowercase();
            if project_env.starts_with(&target) {
                return true;
            }
            let project = conn.project();
            let env = conn.env();
            (!project.is_empty() && project.to_lowercase() == target)
                || (!env.is_empty() && env.to_lowercase() == target)
        })
        .cloned()
        .collect()
}

pub fn is_glob(target: &str) -> bool {
    target.contains(|c: char| c == '*' || c == '?')
}

/// Anchored regex source for a glob where only `*` and `?` are special.
pub fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    pattern
}

fn compile_glob(glob: &str) -> Result<Regex, ResolveError> {
    Regex::new(&glob_to_regex(glob)).map_err(|source| ResolveError::InvalidPattern {
        pattern: glob.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(vec![
            Connection::new("web-prod-1", "web1.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["web", "production"]),
            Connection::new("web-prod-2", "web2.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["web", "production"]),
            Connection::new("db-prod", "db.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["database", "production"]),
            Connection::new("web-staging", "web.staging.example.com")
                .with_project_env("myapp", "staging")
                .with_tags(["web", "staging"]),
            Connection::new("api-prod", "api.prod.example.com")
                .with_project_env("api", "prod")
                .with_tags(["api"]),
        ])
        .with_group("production", ["web-prod-1", "web-prod-2", "db-prod"])
        .with_group("web-tier", ["web-staging", "ghost", "web-prod-1"])
        .with_group("empty", Vec::<String>::new())
    }

    fn ids(result: &ResolveResult) -> Vec<&str> {
        result.connections.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_named_group_keeps_member_order_and_skips_unknown() {
        let result = resolve_target("web-tier", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::NamedGroup);
        assert_eq!(ids(&result), vec!["web-staging", "web-prod-1"]);
    }

    #[test]
    fn test_empty_group_still_wins() {
        let result = resolve_target("empty", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::NamedGroup);
        assert!(result.is_empty());
    }

    #[test]
    fn test_project_env() {
        let result = resolve_target("myapp-prod", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::ProjectEnv);
        assert_eq!(ids(&result), vec!["web-prod-1", "web-prod-2", "db-prod"]);
    }

    #[test]
    fn test_project_or_env_alone() {
        let by_project = resolve_target("MyApp", &registry()).unwrap();
        assert_eq!(by_project.method, MatchMethod::ProjectEnv);
        assert_eq!(by_project.connections.len(), 4);

        let by_env = resolve_target("prod", &registry()).unwrap();
        assert_eq!(by_env.method, MatchMethod::ProjectEnv);
        assert_eq!(by_env.connections.len(), 4);
    }

    #[test]
    fn test_glob_star_and_question_mark() {
        let star = resolve_target("web-prod-*", &registry()).unwrap();
        assert_eq!(star.method, MatchMethod::Glob);
        assert_eq!(ids(&star), vec!["web-prod-1", "web-prod-2"]);

        let single = resolve_target("web-prod-?", &registry()).unwrap();
        assert_eq!(single.connections.len(), 2);
    }

    #[test]
    fn test_glob_without_hits_is_still_glob() {
        let result = resolve_target("zzz*", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::Glob);
        assert!(result.is_empty());
    }

    #[test]
    fn test_fuzzy_fallback() {
        let result = resolve_target("stag", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert_eq!(ids(&result), vec!["web-staging"]);
    }

    #[test]
    fn test_nothing_matches() {
        let result = resolve_target("nonexistent-server-xyz", &registry()).unwrap();
        assert_eq!(result.method, MatchMethod::None);
        assert!(result.is_empty());
    }

    #[test]
    fn test_glob_to_regex() {
        assert_eq!(glob_to_regex("web*"), "^web.*$");
        assert_eq!(glob_to_regex("exact"), "^exact$");
        assert_eq!(glob_to_regex("*"), "^.*$");
        assert_eq!(glob_to_regex("a.b+(c)"), r"^a\.b\+\(c\)$");

        let re = compile_glob("prod-?-db").unwrap();
        assert!(re.is_match("prod-1-db"));
        assert!(!re.is_match("prod-12-db"));
        assert!(!re.is_match("xprod-1-db"));
    }

    #[test]
    fn test_glob_metacharacters_are_literal() {
        let registry = Registry::new(vec![
            Connection::new("a.b-1", "h1"),
            Connection::new("axb-1", "h2"),
        ]);
        let result = resolve_target("a.b-*", &registry).unwrap();
        assert_eq!(ids(&result), vec!["a.b-1"]);
    }

    #[test]
    fn test_match_method_display() {
        assert_eq!(MatchMethod::NamedGroup.to_string(), "named group");
        assert_eq!(MatchMethod::ProjectEnv.to_string(), "project-env pattern");
        assert_eq!(MatchMethod::Glob.to_string(), "glob pattern");
        assert_eq!(MatchMethod::Fuzzy.to_string(), "fuzzy match");
        assert_eq!(MatchMethod::None.to_string(), "none");
    }
}
