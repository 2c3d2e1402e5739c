//! The shipped scenario files must parse and compile to driver scripts.

use std::collections::BTreeSet;
use std::path::PathBuf;

use uiproof_runner::driver::{Driver, DriverConfig};
use uiproof_runner::scenario::{Scenario, Step};

fn shipped_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

#[test]
fn every_shipped_scenario_parses() {
    let scenarios = Scenario::load_all(&shipped_dir()).unwrap();
    assert_eq!(scenarios.len(), 8);

    let names: BTreeSet<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names.len(), scenarios.len(), "scenario names must be unique");
    assert!(names.contains("job-logs-live"));
    assert!(names.contains("franchise-hub"));
    assert!(names.contains("blackjack"));

    for scenario in &scenarios {
        assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.name);
    }
}

#[test]
fn every_shipped_scenario_compiles_to_a_script() {
    let driver = Driver::new(DriverConfig::default());

    for scenario in Scenario::load_all(&shipped_dir()).unwrap() {
        let script = driver.build_script(&scenario);
        assert!(script.contains("require('playwright')"), "{}", scenario.name);
        assert!(script.contains("browser.close()"), "{}", scenario.name);
    }
}

#[test]
fn job_logs_scenario_creates_one_job_and_waits_for_logs() {
    let scenarios = Scenario::load_all(&shipped_dir()).unwrap();
    let job_logs = scenarios.iter().find(|s| s.name == "job-logs-live").unwrap();

    assert_eq!(job_logs.setup.len(), 1, "exactly one remote job is created");
    assert_eq!(
        job_logs.setup[0].save.get("job_id").map(String::as_str),
        Some("/jobId")
    );

    let waits: Vec<(&str, u64)> = job_logs
        .steps
        .iter()
        .filter_map(|s| match s {
            Step::Wait { selector, timeout_ms, .. } => Some((selector.as_str(), *timeout_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(
        waits,
        vec![
            ("text=connected", 20000),
            ("text=Step 1: Generating script", 40000),
        ]
    );
}

#[test]
fn franchise_scenario_overrides_the_team_fixture_mid_run() {
    let scenarios = Scenario::load_all(&shipped_dir()).unwrap();
    let hub = scenarios.iter().find(|s| s.name == "franchise-hub").unwrap();

    // Initial fixture: empty roster.
    let initial = hub
        .routes
        .iter()
        .find(|r| r.pattern == "**/api/teams/test-team-123")
        .unwrap();
    assert!(initial.body.contains(r#""roster": []"#));

    // Mid-run re-registration carries the recruit; the wait for the
    // literal roster text comes after it.
    let mock_at = hub
        .steps
        .iter()
        .position(|s| matches!(s, Step::MockRoute { route } if route.body.contains("Ace Pitcher")))
        .unwrap();
    let ace_wait_at = hub
        .steps
        .iter()
        .position(|s| matches!(s, Step::Wait { selector, .. } if selector == "text=Ace Pitcher"))
        .unwrap();
    let pool_wait_at = hub
        .steps
        .iter()
        .position(|s| matches!(s, Step::Wait { selector, .. } if selector == "text=26"))
        .unwrap();
    assert!(mock_at < ace_wait_at);
    assert!(ace_wait_at < pool_wait_at);
}
