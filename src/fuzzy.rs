//! Ranking of connections against a free-form query.
//!
//! Every field of a connection contributes an independent score floor; the
//! identifier checks dominate, host, tag and project/env hits only lift a
//! connection that would otherwise score lower.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::models::Connection;

pub const EXACT_MATCH_SCORE: i32 = 1000;

const HOST_FLOOR: i32 = 40;
const TAG_EXACT_FLOOR: i32 = 80;
const TAG_CONTAINS_FLOOR: i32 = 30;
const PROJECT_ENV_FLOOR: i32 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub connection: &'a Connection,
    pub score: i32,
}

/// Score one connection against `query`. Zero or less means no match.
pub fn score(query: &str, conn: &Connection) -> i32 {
    score_with(&subsequence_matcher(), &query.to_lowercase(), conn)
}

/// All connections scoring above zero, best first. Ties go to the shorter id.
pub fn find_matches<'a>(query: &str, connections: &'a [Connection]) -> Vec<Match<'a>> {
    if query.is_empty() {
        return Vec::new();
    }

    let matcher = subsequence_matcher();
    let query = query.to_lowercase();

    let mut matches: Vec<Match<'a>> = connections
        .iter()
        .filter_map(|conn| {
            let score = score_with(&matcher, &query, conn);
            (score > 0).then_some(Match {
                connection: conn,
                score,
            })
        })
        .collect();

    // Stable sort keeps registry order among full ties.
    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.connection.id.len().cmp(&b.connection.id.len()))
    });

    matches
}

pub fn find_best_match<'a>(query: &str, connections: &'a [Connection]) -> Option<&'a Connection> {
    find_matches(query, connections)
        .first()
        .map(|m| m.connection)
}

/// Exact identifier lookup.
pub fn find_by_id<'a>(id: &str, connections: &'a [Connection]) -> Option<&'a Connection> {
    connections.iter().find(|conn| conn.id == id)
}

/// Connections carrying `tag`, compared case-insensitively.
pub fn match_by_tag(tag: &str, connections: &[Connection]) -> Vec<Connection> {
    let tag = tag.to_lowercase();
    connections
        .iter()
        .filter(|conn| conn.tags.iter().any(|t| t.to_lowercase() == tag))
        .cloned()
        .collect()
}

fn subsequence_matcher() -> SkimMatcherV2 {
    SkimMatcherV2::default().ignore_case()
}

// `query` must already be lowercase.
fn score_with(matcher: &SkimMatcherV2, query: &str, conn: &Connection) -> i32 {
    let id = conn.id.to_lowercase();
    if id == query {
        return EXACT_MATCH_SCORE;
    }

    let id_len = conn.id.len() as i32;
    let mut score = if id.starts_with(query) {
        100 + (100 - id_len)
    } else if id.contains(query) {
        50 + (50 - id_len)
    } else if matcher.fuzzy_match(&id, query).is_some() {
        25 + (25 - id_len)
    } else {
        0
    };

    let mut raise = |floor: i32| score = score.max(floor);

    if conn.host.to_lowercase().contains(query) {
        raise(HOST_FLOOR);
    }

    for tag in &conn.tags {
        let tag = tag.to_lowercase();
        if tag == query {
            raise(TAG_EXACT_FLOOR);
        } else if tag.contains(query) {
            raise(TAG_CONTAINS_FLOOR);
        }
    }

    for field in [conn.project(), conn.env()] {
        if !field.is_empty() && field.to_lowercase().contains(query) {
            raise(PROJECT_ENV_FLOOR);
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Connection> {
        vec![
            Connection::new("web-prod-1", "web1.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["web", "production"]),
            Connection::new("web-prod-2", "web2.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["web", "production"]),
            Connection::new("db-prod", "db.prod.example.com")
                .with_project_env("myapp", "prod")
                .with_tags(["database"]),
            Connection::new("web", "web.example.com"),
        ]
    }

    #[test]
    fn test_exact_id_ranks_first() {
        let conns = sample();
        let matches = find_matches("WEB", &conns);
        assert_eq!(matches[0].connection.id, "web");
        assert_eq!(matches[0].score, EXACT_MATCH_SCORE);
    }

    #[test]
    fn test_prefix_scores_by_length() {
        let conn = Connection::new("web-prod-1", "10.0.0.1");
        assert_eq!(score("web", &conn), 100 + (100 - 10));
    }

    #[test]
    fn test_substring_and_subsequence_scores() {
        let conn = Connection::new("db-prod", "10.0.0.1");
        assert_eq!(score("prod", &conn), 50 + (50 - 7));
        assert_eq!(score("dpd", &conn), 25 + (25 - 7));
    }

    #[test]
    fn test_field_floors_do_not_add_up() {
        let conn = Connection::new("alpha", "backup.internal")
            .with_project_env("backup", "ops")
            .with_tags(["backup"]);
        // Host (40), project (35) and exact tag (80) all hit; the highest wins.
        assert_eq!(score("backup", &conn), 80);
    }

    #[test]
    fn test_tag_contains_floor() {
        let conn = Connection::new("zeta", "10.0.0.9").with_tags(["postgres"]);
        assert_eq!(score("gres", &conn), 30);
    }

    #[test]
    fn test_no_match_is_excluded() {
        let conns = sample();
        assert!(find_matches("zzz", &conns).is_empty());
        assert!(find_matches("", &conns).is_empty());
        assert!(find_best_match("zzz", &conns).is_none());
    }

    #[test]
    fn test_ties_prefer_shorter_id() {
        let conns = vec![
            Connection::new("x-long-name", "h1").with_tags(["cache"]),
            Connection::new("x-short", "h2").with_tags(["cache"]),
        ];
        let matches = find_matches("cache", &conns);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].connection.id, "x-short");
    }

    #[test]
    fn test_find_by_id_is_exact() {
        let conns = sample();
        assert!(find_by_id("web-prod-1", &conns).is_some());
        assert!(find_by_id("web-prod", &conns).is_none());
        assert!(find_by_id("WEB", &conns).is_none());
    }

    #[test]
    fn test_match_by_tag_ignores_case() {
        let conns = sample();
        assert_eq!(match_by_tag("WEB", &conns).len(), 2);
        assert_eq!(match_by_tag("database", &conns).len(), 1);
        assert!(match_by_tag("nonexistent", &conns).is_empty());
    }
}
