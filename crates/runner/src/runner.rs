//! Orchestration: scenarios in, suite report and exit status out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::driver::{Driver, DriverConfig, StepOutcome};
use crate::error::{Error, Result};
use crate::routes::RouteTable;
use crate::scenario::{Scenario, Step};
use crate::setup::{self, Vars};
use crate::target::{TargetConfig, TargetHandle};
use crate::visual::{VisualChecker, VisualConfig};

/// Report for one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Steps that completed, in order; nothing past a failed step runs
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visual: Vec<VisualOutcome>,
}

/// Report for one baseline comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualOutcome {
    pub shot: String,
    pub matches: bool,
    pub diff_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_image_path: Option<String>,
}

/// Aggregated report for a whole invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    /// Aggregate scenario reports into suite counts
    pub fn from_results(
        started_at: DateTime<Utc>,
        duration_ms: u64,
        scenarios: Vec<ScenarioReport>,
    ) -> Self {
        let passed = scenarios.iter().filter(|s| s.success).count();
        Self {
            started_at,
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            duration_ms,
            scenarios,
        }
    }
}

/// Configuration for the verification runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding scenario YAML files (and fixture files)
    pub scenarios_dir: PathBuf,

    /// Directory the suite report is written to
    pub report_dir: PathBuf,

    /// Driver configuration (browser, evidence directory, base URL)
    pub driver: DriverConfig,

    /// Visual check configuration
    pub visual: VisualConfig,

    /// When set, the target app is acquired (probed or spawned) first
    pub target: Option<TargetConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            report_dir: PathBuf::from("verification"),
            driver: DriverConfig::default(),
            visual: VisualConfig::default(),
            target: None,
        }
    }
}

/// Main verification runner
pub struct Runner {
    config: RunnerConfig,
    target: Option<TargetHandle>,
}

impl Runner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, target: None }
    }

    /// Acquire the target app when one is configured
    pub async fn ensure_target(&mut self) -> Result<()> {
        if self.target.is_some() {
            return Ok(());
        }
        let Some(target_config) = self.config.target.clone() else {
            return Ok(());
        };

        let handle = TargetHandle::acquire(target_config).await?;
        self.config.driver.base_url = handle.base_url().to_string();
        self.target = Some(handle);
        Ok(())
    }

    /// Release a spawned target
    pub fn stop_target(&mut self) {
        if let Some(mut target) = self.target.take() {
            target.stop();
        }
    }

    /// Run every scenario in the scenarios directory
    pub async fn run_all(&mut self) -> Result<SuiteReport> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> Result<SuiteReport> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = scenarios
            .into_iter()
            .filter(|s| s.tags.contains(&tag.to_string()))
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run a single scenario by name
    pub async fn run_named(&mut self, name: &str) -> Result<SuiteReport> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::ScenarioNotFound(name.to_string()))?;
        self.run_scenarios(&[scenario]).await
    }

    /// Run a list of scenarios; the suite continues past failures and
    /// the report carries every outcome.
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> Result<SuiteReport> {
        Driver::check_installed()?;
        self.ensure_target().await?;

        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let report = self.run_scenario(scenario).await?;
            if report.success {
                info!("✓ {} ({} ms)", report.name, report.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    report.name,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(report);
        }

        let suite = SuiteReport::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!("");
        info!(
            "Results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run one scenario: setup calls, variable substitution, fixture
    /// inlining, the driver script, then visual checks.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> Result<ScenarioReport> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        // Prerequisite calls; their failure fails the scenario before a
        // browser launches and no step executes.
        let mut vars = Vars::new();
        if let Err(e) = setup::run_setup(&scenario.setup, &mut vars).await {
            return Ok(ScenarioReport {
                name: scenario.name.clone(),
                success: false,
                duration_ms: start.elapsed().as_millis() as u64,
                steps: vec![],
                failed_step: Some("setup".to_string()),
                error: Some(e.to_string()),
                visual: vec![],
            });
        }

        let mut resolved = setup::apply_vars(scenario, &vars)?;
        for route in &mut resolved.routes {
            route.resolve_body(&self.config.scenarios_dir)?;
        }
        for step in &mut resolved.steps {
            if let Step::MockRoute { route } = step {
                route.resolve_body(&self.config.scenarios_dir)?;
            }
        }

        // Register every rule once up front so a bad glob fails the
        // scenario here instead of inside the generated script.
        let mut table = RouteTable::new();
        for route in &resolved.routes {
            table.register(route.clone())?;
        }
        for step in &resolved.steps {
            if let Step::MockRoute { route } = step {
                table.register(route.clone())?;
            }
        }
        debug!("{}: {} mocked route(s)", resolved.name, table.len());

        let driver = Driver::new(self.config.driver.clone());
        let output = driver.run(&resolved).await?;

        let mut success = output.success;
        let mut scenario_error = output.error;
        let mut visual = Vec::new();

        if resolved.visual_regression && success {
            let checker = VisualChecker::new(self.config.visual.clone())?;
            let shots: Vec<&str> = output.steps.iter().filter_map(|s| s.shot.as_deref()).collect();

            for shot in shots {
                match checker.compare(&resolved.name, shot, Some(resolved.visual_threshold)) {
                    Ok(diff) => {
                        if !diff.matches {
                            success = false;
                            scenario_error = Some(format!(
                                "visual regression in '{}': {:.2}% pixels differ",
                                shot, diff.diff_percent
                            ));
                        }
                        visual.push(VisualOutcome {
                            shot: shot.to_string(),
                            matches: diff.matches,
                            diff_percent: diff.diff_percent,
                            diff_image_path: diff
                                .diff_image_path
                                .map(|p| p.to_string_lossy().to_string()),
                        });
                    }
                    Err(Error::BaselineNotFound(_)) => {
                        info!(
                            "No baseline for '{}/{}' - record one with baseline update",
                            resolved.name, shot
                        );
                    }
                    Err(e) => {
                        success = false;
                        scenario_error = Some(format!("visual comparison error: {}", e));
                    }
                }
            }
        }

        Ok(ScenarioReport {
            name: resolved.name.clone(),
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            steps: output.steps,
            failed_step: output.failed_step,
            error: scenario_error,
            visual,
        })
    }

    /// Record current evidence shots as baselines for the given scenarios
    pub fn update_baselines(&self, scenarios: &[Scenario]) -> Result<usize> {
        let checker = VisualChecker::new(self.config.visual.clone())?;
        let mut updated = 0;
        for scenario in scenarios {
            updated += checker.update_scenario_baselines(&scenario.name)?;
        }
        Ok(updated)
    }

    /// Write the suite report as JSON, overwriting the previous run's
    pub fn write_report(&self, report: &SuiteReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.report_dir)?;

        let path = self.config.report_dir.join("report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop_target();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, success: bool) -> ScenarioReport {
        ScenarioReport {
            name: name.to_string(),
            success,
            duration_ms: 1,
            steps: vec![],
            failed_step: None,
            error: None,
            visual: vec![],
        }
    }

    #[test]
    fn suite_counts_add_up() {
        let suite = SuiteReport::from_results(
            Utc::now(),
            42,
            vec![report("a", true), report("b", false), report("c", true)],
        );
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 2);
        assert_eq!(suite.failed, 1);
    }

    #[tokio::test]
    async fn run_named_rejects_unknown_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "name: a\nsteps:\n  - action: sleep\n    ms: 1\n",
        )
        .unwrap();

        let mut runner = Runner::with_config(RunnerConfig {
            scenarios_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        match runner.run_named("absent").await {
            Err(Error::ScenarioNotFound(name)) => assert_eq!(name, "absent"),
            other => panic!("expected ScenarioNotFound, got {:?}", other.map(|s| s.total)),
        }
    }

    #[test]
    fn report_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::with_config(RunnerConfig {
            report_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let first = SuiteReport::from_results(Utc::now(), 1, vec![report("a", true)]);
        let second = SuiteReport::from_results(Utc::now(), 2, vec![report("a", false)]);

        let path1 = runner.write_report(&first).unwrap();
        let path2 = runner.write_report(&second).unwrap();
        assert_eq!(path1, path2);

        let written: SuiteReport =
            serde_json::from_str(&std::fs::read_to_string(path2).unwrap()).unwrap();
        assert_eq!(written.failed, 1);
    }
}
