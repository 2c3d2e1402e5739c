//! Declarative YAML verification scenarios

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::routes::RouteRule;
use crate::setup::SetupCall;

/// A complete verification scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Base URL of the application under verification.
    /// Falls back to the runner-wide base URL when absent.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Mocked HTTP routes registered before the first navigation
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    /// Prerequisite HTTP calls executed before the browser launches
    #[serde(default)]
    pub setup: Vec<SetupCall>,

    /// Scripts injected into every page before any of its own code runs
    #[serde(default)]
    pub init_scripts: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<Step>,

    /// Whether screenshots are compared against baselines
    #[serde(default)]
    pub visual_regression: bool,

    /// Threshold for visual diff (0.0 - 100.0 percent)
    #[serde(default = "default_threshold")]
    pub visual_threshold: f64,
}

fn default_viewport() -> Viewport {
    Viewport { width: 1280, height: 720 }
}

fn default_threshold() -> f64 {
    0.5 // 0.5% pixel difference allowed by default
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A point relative to an element's top-left corner, in CSS pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL, or absolute)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Click an element, optionally at a point relative to it
    Click {
        selector: String,
        #[serde(default)]
        position: Option<Position>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click at absolute page coordinates (canvas games have no DOM to target)
    ClickAt {
        x: f64,
        y: f64,
    },

    /// Fill an input field
    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        clear_first: bool,
    },

    /// Type text with keyboard simulation
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    /// Press a key
    Press {
        #[serde(default)]
        selector: Option<String>,
        key: String,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait for the page URL to match a glob pattern
    WaitUrl {
        pattern: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Assert something about an element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeCheck>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Capture an evidence screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        full_page: bool,
    },

    /// Re-register a mocked route mid-run (last registration wins)
    MockRoute {
        #[serde(flatten)]
        route: RouteRule,
    },

    /// Hover over an element
    Hover {
        selector: String,
    },

    /// Focus an element
    Focus {
        selector: String,
    },

    /// Select an option from a dropdown
    Select {
        selector: String,
        value: String,
    },

    /// Check a checkbox
    Check {
        selector: String,
    },

    /// Uncheck a checkbox
    Uncheck {
        selector: String,
    },

    /// Execute custom JavaScript in the page
    Evaluate {
        script: String,
        #[serde(default)]
        expected: Option<serde_json::Value>,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_timeout() -> u64 {
    5000 // 5 seconds default
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeCheck {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl Step {
    /// Short label used in progress output and reports
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::ClickAt { x, y } => format!("click_at:{},{}", x, y),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Type { selector, .. } => format!("type:{}", selector),
            Step::Press { key, .. } => format!("press:{}", key),
            Step::Wait { selector, .. } => format!("wait:{}", selector),
            Step::WaitUrl { pattern, .. } => format!("wait_url:{}", pattern),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Assert { selector, .. } => format!("assert:{}", selector),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::MockRoute { route } => format!("mock_route:{}", route.pattern),
            Step::Hover { selector } => format!("hover:{}", selector),
            Step::Focus { selector } => format!("focus:{}", selector),
            Step::Select { selector, .. } => format!("select:{}", selector),
            Step::Check { selector } => format!("check:{}", selector),
            Step::Uncheck { selector } => format!("uncheck:{}", selector),
            Step::Evaluate { .. } => "evaluate".to_string(),
            Step::Log { message } => format!("log:{}", &message[..message.len().min(30)]),
        }
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            Error::ScenarioParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, sorted by file name
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let scenario = Self::from_file(entry.path())?;
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.contains(&tag.to_string())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_scenario() {
        let yaml = r#"
name: rhythm-blocks
description: Title and start button are visible before gameplay
tags:
  - games
  - smoke
steps:
  - action: navigate
    url: /games/rhythm-blocks/index.html
  - action: assert
    selector: 'role=heading[name="Rhythm Blocks"]'
    visible: true
  - action: screenshot
    name: start
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "rhythm-blocks");
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.viewport.width, 1280);
        assert!(!scenario.visual_regression);
    }

    #[test]
    fn parse_scenario_with_routes_and_setup() {
        let yaml = r#"
name: franchise-hub
base_url: http://127.0.0.1:3001
routes:
  - pattern: '**/api/teams'
    status: 201
    body: '{"id": "t1"}'
setup:
  - url: http://127.0.0.1:3000/api/v1/generate
    json:
      prompt: hello
    save:
      job_id: /jobId
init_scripts:
  - "localStorage.setItem('token', 'fake-token')"
steps:
  - action: navigate
    url: /jobs/{job_id}
  - action: mock_route
    pattern: '**/api/teams/t1'
    body: '{"roster": []}'
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.routes.len(), 1);
        assert_eq!(scenario.routes[0].status, 201);
        assert_eq!(scenario.setup.len(), 1);
        assert_eq!(scenario.setup[0].save.get("job_id").map(String::as_str), Some("/jobId"));
        assert_eq!(scenario.init_scripts.len(), 1);
        match &scenario.steps[1] {
            Step::MockRoute { route } => {
                assert_eq!(route.pattern, "**/api/teams/t1");
                assert_eq!(route.status, 200);
            }
            other => panic!("expected mock_route, got {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let yaml = r#"
name: bad
steps:
  - action: teleport
    url: /nowhere
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn click_positions_parse() {
        let yaml = r#"
name: blackjack
steps:
  - action: click
    selector: '#gameCanvas'
    position:
      x: 400
      y: 560
  - action: click_at
    x: 200
    y: 200
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::Click { position: Some(p), .. } => {
                assert_eq!(p.x, 400.0);
                assert_eq!(p.y, 560.0);
            }
            other => panic!("expected click with position, got {:?}", other),
        }
        assert_eq!(scenario.steps[1].label(), "click_at:200,200");
    }

    #[test]
    fn filter_by_tag_matches() {
        let a = Scenario::from_yaml("name: a\ntags: [games]\nsteps: []").unwrap();
        let b = Scenario::from_yaml("name: b\ntags: [dashboard]\nsteps: []").unwrap();
        let all = vec![a, b];
        let games = Scenario::filter_by_tag(&all, "games");
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].name, "a");
    }
}
