//! Mocked HTTP routes: static fixtures substituted for backend calls
//!
//! A route rule pairs a URL glob pattern with a canned response. The
//! fixture body is returned verbatim for every request matching the
//! pattern, regardless of call count. Re-registering a pattern replaces
//! the earlier rule: last registration wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// A single mocked route: pattern plus canned response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// URL glob pattern: `**` crosses `/`, `*` does not, `?` is one character
    pub pattern: String,

    /// HTTP status of the canned response
    #[serde(default = "default_status")]
    pub status: u16,

    /// Content-Type header of the canned response
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Fixture body, returned byte-for-byte
    #[serde(default)]
    pub body: String,

    /// Load the fixture body from a file instead (relative to the scenario dir)
    #[serde(default)]
    pub body_file: Option<String>,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl RouteRule {
    /// Inline the fixture body, reading `body_file` when set
    pub fn resolve_body(&mut self, fixtures_root: &Path) -> Result<()> {
        if let Some(file) = self.body_file.take() {
            let path = fixtures_root.join(&file);
            self.body = std::fs::read_to_string(&path)
                .map_err(|_| Error::FixtureNotFound(path.display().to_string()))?;
        }
        Ok(())
    }
}

/// Ordered set of route rules with last-registration-wins resolution
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<(Regex, RouteRule)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. An existing rule with the identical pattern is
    /// removed first, so the new registration also outranks rules added
    /// in between.
    pub fn register(&mut self, rule: RouteRule) -> Result<()> {
        let regex = glob_to_regex(&rule.pattern)?;
        self.entries.retain(|(_, existing)| existing.pattern != rule.pattern);
        self.entries.push((regex, rule));
        Ok(())
    }

    /// Resolve a URL to the most recently registered matching rule
    pub fn resolve(&self, url: &str) -> Option<&RouteRule> {
        self.entries
            .iter()
            .rev()
            .find(|(regex, _)| regex.is_match(url))
            .map(|(_, rule)| rule)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compile a URL glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }

    regex.push('$');
    Regex::new(&regex).map_err(|e| Error::RoutePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn rule(pattern: &str, body: &str) -> RouteRule {
        RouteRule {
            pattern: pattern.to_string(),
            status: 200,
            content_type: "application/json".to_string(),
            body: body.to_string(),
            body_file: None,
        }
    }

    #[test_case("**/api/teams", "http://localhost:3001/api/teams", true; "double star crosses host and slashes")]
    #[test_case("**/api/teams", "http://localhost:3001/api/teams/t1", false; "anchored at the end")]
    #[test_case("**/api/teams/*/players", "http://x/api/teams/t1/players", true; "single star within a segment")]
    #[test_case("**/api/teams/*/players", "http://x/api/teams/t1/extra/players", false; "single star does not cross slashes")]
    #[test_case("**/jobs/????", "http://x/jobs/1234", true; "question mark is one character")]
    #[test_case("**/index.html", "http://x/games/indexXhtml", false; "dot is literal")]
    fn glob_matching(pattern: &str, url: &str, expected: bool) {
        let regex = glob_to_regex(pattern).unwrap();
        assert_eq!(regex.is_match(url), expected, "{} vs {}", pattern, url);
    }

    #[test]
    fn fixture_returned_verbatim_for_every_call() {
        let mut table = RouteTable::new();
        table.register(rule("**/api/teams", r#"{"id": "t1"}"#)).unwrap();

        // Call count must not matter.
        for _ in 0..3 {
            let hit = table.resolve("http://localhost:3001/api/teams").unwrap();
            assert_eq!(hit.body, r#"{"id": "t1"}"#);
            assert_eq!(hit.status, 200);
        }
    }

    #[test]
    fn last_registration_wins_for_a_pattern() {
        let mut table = RouteTable::new();
        table.register(rule("**/api/teams/t1", r#"{"roster": []}"#)).unwrap();
        table.register(rule("**/api/**", r#"{"fallback": true}"#)).unwrap();
        table
            .register(rule("**/api/teams/t1", r#"{"roster": [{"name": "Ace Pitcher"}]}"#))
            .unwrap();

        assert_eq!(table.len(), 2);
        let hit = table.resolve("http://x/api/teams/t1").unwrap();
        assert!(hit.body.contains("Ace Pitcher"));

        // Other patterns are untouched.
        let other = table.resolve("http://x/api/seasons").unwrap();
        assert_eq!(other.body, r#"{"fallback": true}"#);
    }

    #[test]
    fn unmatched_url_resolves_to_none() {
        let mut table = RouteTable::new();
        table.register(rule("**/api/teams", "{}")).unwrap();
        assert!(table.resolve("http://x/health").is_none());
    }

    #[test]
    fn body_file_fixture_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("team.json"), r#"{"id": "t1"}"#).unwrap();

        let mut rule = RouteRule {
            pattern: "**/api/teams".to_string(),
            status: 200,
            content_type: "application/json".to_string(),
            body: String::new(),
            body_file: Some("team.json".to_string()),
        };
        rule.resolve_body(dir.path()).unwrap();
        assert_eq!(rule.body, r#"{"id": "t1"}"#);
        assert!(rule.body_file.is_none());

        let mut missing = RouteRule {
            body_file: Some("absent.json".to_string()),
            ..rule
        };
        assert!(matches!(missing.resolve_body(dir.path()), Err(Error::FixtureNotFound(_))));
    }
}
