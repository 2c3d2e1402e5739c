//! Playwright browser automation
//!
//! A whole scenario compiles to a single Node script: route interception
//! and init scripts are page state, and flows like the live-log viewer
//! keep an SSE session open across steps, so the browser must live for
//! the full run. The script reports per-step progress and the final
//! verdict as JSON lines on stdout, which the driver parses back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{Error, Result};
use crate::routes::RouteRule;
use crate::scenario::{Scenario, Step, WaitState};

/// Browser engine to drive
#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(Error::Driver(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for the Playwright driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Default base URL, overridable per scenario
    pub base_url: String,

    /// Root directory for evidence screenshots
    pub evidence_dir: PathBuf,

    /// Browser engine
    pub browser: Browser,

    /// Run without a visible browser window
    pub headless: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            evidence_dir: PathBuf::from("verification"),
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub duration_ms: u64,
    /// Evidence shot name, for screenshot steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot: Option<String>,
}

/// Parsed result of a full scenario script
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    /// Label of the step that threw, when the script failed
    pub failed_step: Option<String>,
    pub error: Option<String>,
}

/// One JSON line emitted by the generated script
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverEvent {
    Step {
        name: String,
        #[serde(default)]
        shot: Option<String>,
        ms: u64,
    },
    Result {
        success: bool,
        #[serde(default)]
        step: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Log {
        message: String,
    },
}

/// Deterministic evidence path for a scenario's named shot.
/// Repeated runs overwrite; there is no retention policy.
pub fn evidence_path(root: &Path, scenario: &str, shot: &str) -> PathBuf {
    root.join(scenario).join(format!("{}.png", shot))
}

/// Playwright driver: compiles scenarios to Node scripts and runs them
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Check that Playwright is available via npx
    pub fn check_installed() -> Result<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(Error::PlaywrightNotFound),
        }
    }

    /// Execute a scenario: generate the script, run it under node, parse
    /// the progress and verdict lines.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScriptOutput> {
        std::fs::create_dir_all(self.config.evidence_dir.join(&scenario.name))?;

        let script = self.build_script(scenario);
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("verify.js");
        std::fs::write(&script_path, &script)?;

        debug!("Running driver script: {}", script_path.display());

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Driver("node not found on PATH".to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_output(&stdout);

        match parsed {
            Some(result) => Ok(result),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::Driver(format!(
                    "script produced no verdict:\nstdout: {}\nstderr: {}",
                    stdout, stderr
                )))
            }
        }
    }

    /// Resolve a step URL against the effective base URL
    fn full_url(&self, scenario: &Scenario, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let base = scenario.base_url.as_deref().unwrap_or(&self.config.base_url);
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }

    /// Build the Node script for a whole scenario
    pub fn build_script(&self, scenario: &Scenario) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = scenario.viewport.width,
            height = scenario.viewport.height,
        ));

        for init in &scenario.init_scripts {
            script.push_str(&format!("  await context.addInitScript({});\n", js(init)));
        }

        script.push_str(
            r#"  const page = await context.newPage();
  let step = 'launch';
  let t = Date.now();
  const done = (shot) => {
    console.log(JSON.stringify({ type: 'step', name: step, shot, ms: Date.now() - t }));
    t = Date.now();
  };

  try {
"#,
        );

        for route in &scenario.routes {
            script.push_str(&route_js(route));
        }

        for step in &scenario.steps {
            script.push('\n');
            script.push_str(&format!("    step = {};\n", js(&step.label())));
            script.push_str(&self.step_js(scenario, step));
            match step {
                Step::Screenshot { name, .. } => {
                    script.push_str(&format!("    done({});\n", js(name)));
                }
                _ => script.push_str("    done();\n"),
            }
        }

        script.push_str(
            r#"
    console.log(JSON.stringify({ type: 'result', success: true }));
  } catch (error) {
    console.log(JSON.stringify({ type: 'result', success: false, step, error: error.message }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    /// Convert a step to script lines
    fn step_js(&self, scenario: &Scenario, step: &Step) -> String {
        match step {
            Step::Navigate { url, wait_for_selector } => {
                let mut code = format!(
                    "    await page.goto({});\n",
                    js(&self.full_url(scenario, url))
                );
                if let Some(selector) = wait_for_selector {
                    code.push_str(&format!("    await page.waitForSelector({});\n", js(selector)));
                }
                code
            }
            Step::Click { selector, position, timeout_ms } => {
                let timeout = timeout_ms.unwrap_or(5000);
                match position {
                    Some(p) => format!(
                        "    await page.click({}, {{ position: {{ x: {}, y: {} }}, timeout: {} }});\n",
                        js(selector), p.x, p.y, timeout
                    ),
                    None => format!(
                        "    await page.click({}, {{ timeout: {} }});\n",
                        js(selector), timeout
                    ),
                }
            }
            Step::ClickAt { x, y } => {
                format!("    await page.mouse.click({}, {});\n", x, y)
            }
            Step::Fill { selector, value, clear_first } => {
                if *clear_first {
                    format!(
                        "    await page.fill({sel}, '');\n    await page.fill({sel}, {val});\n",
                        sel = js(selector),
                        val = js(value)
                    )
                } else {
                    format!("    await page.fill({}, {});\n", js(selector), js(value))
                }
            }
            Step::Type { selector, text, delay_ms } => {
                let delay = delay_ms.unwrap_or(50);
                format!(
                    "    await page.type({}, {}, {{ delay: {} }});\n",
                    js(selector), js(text), delay
                )
            }
            Step::Press { selector, key } => match selector {
                Some(selector) => format!(
                    "    await page.locator({}).press({});\n",
                    js(selector), js(key)
                ),
                None => format!("    await page.keyboard.press({});\n", js(key)),
            },
            Step::Wait { selector, timeout_ms, state } => {
                format!(
                    "    await page.waitForSelector({}, {{ state: '{}', timeout: {} }});\n",
                    js(selector), wait_state(state), timeout_ms
                )
            }
            Step::WaitUrl { pattern, timeout_ms } => {
                format!(
                    "    await page.waitForURL({}, {{ timeout: {} }});\n",
                    js(pattern), timeout_ms
                )
            }
            Step::Sleep { ms } => {
                format!("    await page.waitForTimeout({});\n", ms)
            }
            Step::Assert { selector, visible, text, text_contains, attribute, count, timeout_ms } => {
                assert_js(selector, *visible, text.as_deref(), text_contains.as_deref(), attribute.as_ref(), *count, *timeout_ms)
            }
            Step::Screenshot { name, selector, full_page } => {
                let path = evidence_path(&self.config.evidence_dir, &scenario.name, name);
                let path = js(&path.to_string_lossy());
                match selector {
                    Some(selector) => format!(
                        "    await page.locator({}).screenshot({{ path: {} }});\n",
                        js(selector), path
                    ),
                    None => format!(
                        "    await page.screenshot({{ path: {}, fullPage: {} }});\n",
                        path, full_page
                    ),
                }
            }
            Step::MockRoute { route } => {
                format!("    await page.unroute({});\n{}", js(&route.pattern), route_js(route))
            }
            Step::Hover { selector } => {
                format!("    await page.hover({});\n", js(selector))
            }
            Step::Focus { selector } => {
                format!("    await page.focus({});\n", js(selector))
            }
            Step::Select { selector, value } => {
                format!("    await page.selectOption({}, {});\n", js(selector), js(value))
            }
            Step::Check { selector } => {
                format!("    await page.check({});\n", js(selector))
            }
            Step::Uncheck { selector } => {
                format!("    await page.uncheck({});\n", js(selector))
            }
            Step::Evaluate { script, expected } => {
                let mut code = format!(
                    "    {{\n      const result = await page.evaluate(() => {{ {} }});\n",
                    script
                );
                if let Some(expected) = expected {
                    code.push_str(&format!(
                        "      if (JSON.stringify(result) !== JSON.stringify({})) throw new Error('evaluate mismatch: ' + JSON.stringify(result));\n",
                        expected
                    ));
                }
                code.push_str("    }\n");
                code
            }
            Step::Log { message } => {
                format!(
                    "    console.log(JSON.stringify({{ type: 'log', message: {} }}));\n",
                    js(message)
                )
            }
        }
    }
}

/// Register a mocked route with its verbatim fixture body
fn route_js(route: &RouteRule) -> String {
    format!(
        "    await page.route({pattern}, (route) => route.fulfill({{ status: {status}, contentType: {content_type}, body: {body} }}));\n",
        pattern = js(&route.pattern),
        status = route.status,
        content_type = js(&route.content_type),
        body = js(&route.body),
    )
}

fn wait_state(state: &WaitState) -> &'static str {
    match state {
        WaitState::Visible => "visible",
        WaitState::Hidden => "hidden",
        WaitState::Attached => "attached",
        WaitState::Detached => "detached",
    }
}

fn assert_js(
    selector: &str,
    visible: Option<bool>,
    text: Option<&str>,
    text_contains: Option<&str>,
    attribute: Option<&crate::scenario::AttributeCheck>,
    count: Option<usize>,
    timeout_ms: u64,
) -> String {
    let mut code = String::new();
    let sel = js(selector);

    if let Some(visible) = visible {
        let state = if visible { "visible" } else { "hidden" };
        code.push_str(&format!(
            "    await page.locator({}).first().waitFor({{ state: '{}', timeout: {} }});\n",
            sel, state, timeout_ms
        ));
    }

    if let Some(expected) = text {
        code.push_str(&format!(
            "    {{\n      const el = page.locator({sel}).first();\n      await el.waitFor({{ state: 'attached', timeout: {timeout} }});\n      const actual = ((await el.textContent()) || '').trim();\n      if (actual !== {expected}) throw new Error('text mismatch: got \"' + actual + '\"');\n    }}\n",
            sel = sel,
            timeout = timeout_ms,
            expected = js(expected),
        ));
    }

    if let Some(expected) = text_contains {
        code.push_str(&format!(
            "    {{\n      const el = page.locator({sel}).first();\n      await el.waitFor({{ state: 'attached', timeout: {timeout} }});\n      const actual = (await el.textContent()) || '';\n      if (!actual.includes({expected})) throw new Error('text missing: got \"' + actual + '\"');\n    }}\n",
            sel = sel,
            timeout = timeout_ms,
            expected = js(expected),
        ));
    }

    if let Some(attribute) = attribute {
        let name = js(&attribute.name);
        if let Some(value) = &attribute.value {
            code.push_str(&format!(
                "    {{\n      const actual = await page.locator({sel}).first().getAttribute({name});\n      if (actual !== {value}) throw new Error('attribute mismatch: got ' + actual);\n    }}\n",
                sel = sel,
                name = name,
                value = js(value),
            ));
        }
        if let Some(contains) = &attribute.contains {
            code.push_str(&format!(
                "    {{\n      const actual = (await page.locator({sel}).first().getAttribute({name})) || '';\n      if (!actual.includes({contains})) throw new Error('attribute missing: got ' + actual);\n    }}\n",
                sel = sel,
                name = name,
                contains = js(contains),
            ));
        }
    }

    if let Some(expected) = count {
        code.push_str(&format!(
            "    {{\n      const n = await page.locator({}).count();\n      if (n !== {}) throw new Error('count mismatch: got ' + n);\n    }}\n",
            sel, expected
        ));
    }

    code
}

/// Quote a Rust string as a JS string literal
fn js(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Parse the JSON progress/verdict lines out of script stdout.
/// Returns None when no verdict line was produced (node crash, syntax error).
fn parse_output(stdout: &str) -> Option<ScriptOutput> {
    let mut steps = Vec::new();
    let mut verdict = None;

    for line in stdout.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<DriverEvent>(line) {
            Ok(DriverEvent::Step { name, shot, ms }) => steps.push(StepOutcome {
                name,
                duration_ms: ms,
                shot,
            }),
            Ok(DriverEvent::Result { success, step, error }) => {
                verdict = Some((success, step, error));
            }
            Ok(DriverEvent::Log { message }) => debug!("[scenario log] {}", message),
            Err(_) => debug!("unrecognized driver output: {}", line),
        }
    }

    verdict.map(|(success, step, error)| ScriptOutput {
        success,
        steps,
        failed_step: if success { None } else { step },
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Driver {
        Driver::new(DriverConfig {
            base_url: "http://127.0.0.1:8080".to_string(),
            evidence_dir: PathBuf::from("verification"),
            ..Default::default()
        })
    }

    fn scenario(yaml: &str) -> Scenario {
        Scenario::from_yaml(yaml).unwrap()
    }

    #[test]
    fn routes_register_before_first_step() {
        let s = scenario(
            r#"
name: hub
routes:
  - pattern: '**/api/teams'
    status: 201
    body: '{"id": "t1", "name": "Test Team"}'
steps:
  - action: navigate
    url: /franchise/create
"#,
        );
        let script = driver().build_script(&s);

        let route_at = script.find("await page.route(").unwrap();
        let goto_at = script.find("await page.goto(").unwrap();
        assert!(route_at < goto_at, "route interception must precede navigation");
        // Fixture body is embedded verbatim, JSON-escaped as one JS string.
        assert!(script.contains(r#"body: "{\"id\": \"t1\", \"name\": \"Test Team\"}""#));
        assert!(script.contains("status: 201"));
    }

    #[test]
    fn mock_route_step_reregisters() {
        let s = scenario(
            r#"
name: hub
steps:
  - action: mock_route
    pattern: '**/api/teams/t1'
    body: '{"roster": []}'
"#,
        );
        let script = driver().build_script(&s);
        let unroute_at = script.find(r#"await page.unroute("**/api/teams/t1")"#).unwrap();
        let route_at = script.find(r#"await page.route("**/api/teams/t1""#).unwrap();
        assert!(unroute_at < route_at, "re-registration replaces the earlier rule");
    }

    #[test]
    fn relative_urls_join_base_absolute_pass_through() {
        let s = scenario(
            r#"
name: nav
steps:
  - action: navigate
    url: /games/blackjack/index.html
  - action: navigate
    url: http://127.0.0.1:3001/jobs/j-42
"#,
        );
        let script = driver().build_script(&s);
        assert!(script.contains(r#"await page.goto("http://127.0.0.1:8080/games/blackjack/index.html")"#));
        assert!(script.contains(r#"await page.goto("http://127.0.0.1:3001/jobs/j-42")"#));
    }

    #[test]
    fn coordinate_clicks_compile() {
        let s = scenario(
            r#"
name: games
steps:
  - action: click
    selector: '#gameCanvas'
    position:
      x: 400
      y: 560
  - action: click_at
    x: 200
    y: 200
"#,
        );
        let script = driver().build_script(&s);
        assert!(script.contains(r##"await page.click("#gameCanvas", { position: { x: 400, y: 560 }, timeout: 5000 })"##));
        assert!(script.contains("await page.mouse.click(200, 200);"));
    }

    #[test]
    fn strings_are_json_quoted() {
        let s = scenario(
            r#"
name: quoting
steps:
  - action: fill
    selector: input[placeholder="Riverport Raccoons"]
    value: O'Brien's "Team"
"#,
        );
        let script = driver().build_script(&s);
        assert!(script.contains(r#"await page.fill("input[placeholder=\"Riverport Raccoons\"]", "O'Brien's \"Team\"")"#));
    }

    #[test]
    fn screenshot_paths_are_deterministic() {
        assert_eq!(
            evidence_path(Path::new("verification"), "blackjack", "betting"),
            PathBuf::from("verification/blackjack/betting.png")
        );

        let s = scenario(
            r#"
name: blackjack
steps:
  - action: screenshot
    name: betting
"#,
        );
        let d = driver();
        // Same scenario, same script, same path: repeated runs overwrite.
        assert_eq!(d.build_script(&s), d.build_script(&s));
        assert!(d.build_script(&s).contains(r#"path: "verification/blackjack/betting.png""#));
    }

    #[test]
    fn init_scripts_attach_to_context() {
        let s = scenario(
            r#"
name: hub
init_scripts:
  - "localStorage.setItem('token', 'fake-token')"
steps:
  - action: sleep
    ms: 10
"#,
        );
        let script = driver().build_script(&s);
        assert!(script.contains(r#"await context.addInitScript("localStorage.setItem('token', 'fake-token')")"#));
        let init_at = script.find("addInitScript").unwrap();
        let page_at = script.find("context.newPage()").unwrap();
        assert!(init_at < page_at);
    }

    #[test]
    fn progress_lines_per_step() {
        let s = scenario(
            r#"
name: progress
steps:
  - action: sleep
    ms: 10
  - action: screenshot
    name: end
"#,
        );
        let script = driver().build_script(&s);
        assert!(script.contains(r#"step = "sleep:10ms";"#));
        assert_eq!(script.matches("done(").count(), 2); // one per step
        assert!(script.contains(r#"done("end");"#));
    }

    #[test]
    fn parse_output_collects_steps_and_verdict() {
        let stdout = r#"
some stray npm noise
{"type":"step","name":"navigate:/jobs/j-42","ms":120}
{"type":"log","message":"hello"}
{"type":"step","name":"screenshot:live-logs","shot":"live-logs","ms":80}
{"type":"result","success":true}
"#;
        let out = parse_output(stdout).unwrap();
        assert!(out.success);
        assert_eq!(out.steps.len(), 2);
        assert_eq!(out.steps[1].shot.as_deref(), Some("live-logs"));
        assert!(out.failed_step.is_none());
    }

    #[test]
    fn parse_output_failure_names_the_step() {
        let stdout = r#"
{"type":"step","name":"navigate:/jobs/j-42","ms":120}
{"type":"result","success":false,"step":"wait:text=connected","error":"Timeout 20000ms exceeded"}
"#;
        let out = parse_output(stdout).unwrap();
        assert!(!out.success);
        // The wait that timed out is the last step reached: nothing after it ran.
        assert_eq!(out.steps.len(), 1);
        assert_eq!(out.failed_step.as_deref(), Some("wait:text=connected"));
        assert!(out.error.as_deref().unwrap().contains("Timeout"));
    }

    #[test]
    fn parse_output_without_verdict_is_none() {
        assert!(parse_output("node: SyntaxError\n").is_none());
    }
}
