//! uiproof CLI - Main Entry Point
//!
//! Runs browser-driven verification scenarios against locally running
//! web applications and reports pass/fail through the exit code:
//! 0 all scenarios passed, 1 at least one failed, 2 runner error.

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use uiproof_runner::driver::DriverConfig;
use uiproof_runner::runner::{Runner, RunnerConfig, SuiteReport};
use uiproof_runner::scenario::Scenario;
use uiproof_runner::target::{TargetConfig, TargetHandle};
use uiproof_runner::visual::VisualConfig;
use uiproof_runner::Driver;

mod output;

use output::{print_error, print_info, print_list, print_success, OutputFormat, TableDisplay};

/// uiproof - Browser-Driven Verification Runner
#[derive(Parser)]
#[command(name = "uiproof")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding scenario YAML files
    #[arg(long, default_value = "scenarios", global = true)]
    scenarios: PathBuf,

    /// Base URL for scenarios that do not carry their own
    #[arg(long, default_value = "http://127.0.0.1:3000", global = true)]
    base_url: String,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run verification scenarios
    Run(RunArgs),

    /// List available scenarios
    List,

    /// Manage visual baselines
    #[command(subcommand)]
    Baseline(BaselineCommands),

    /// Check the environment (Playwright install, target reachability)
    Check,

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Directory for evidence screenshots and the suite report
    #[arg(short, long, default_value = "verification")]
    evidence: PathBuf,

    /// Spawn this binary as the target app before running
    #[arg(long)]
    spawn: Option<PathBuf>,

    /// Health path probed on the target
    #[arg(long, default_value = "/")]
    health_path: String,

    /// Record current screenshots as baselines after the run
    #[arg(long)]
    update_baselines: bool,

    /// Visual diff threshold (percentage)
    #[arg(long, default_value = "0.5")]
    visual_threshold: f64,
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// Record current evidence screenshots as baselines
    Update {
        /// Only this scenario
        #[arg(short, long)]
        name: Option<String>,

        /// Directory holding evidence screenshots
        #[arg(short, long, default_value = "verification")]
        evidence: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            print_error(&format!("Failed to create runtime: {}", e));
            std::process::exit(2);
        }
    };

    match rt.block_on(execute(cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{}", e));
            std::process::exit(2);
        }
    }
}

async fn execute(mut cli: Cli) -> anyhow::Result<bool> {
    let command = std::mem::replace(&mut cli.command, Commands::Version);
    match command {
        Commands::Run(args) => run(&cli, args).await,
        Commands::List => list(&cli),
        Commands::Baseline(cmd) => baseline(&cli, cmd),
        Commands::Check => check(&cli).await,
        Commands::Version => {
            println!("uiproof v{}", env!("CARGO_PKG_VERSION"));
            println!("Browser-driven verification runner");
            Ok(true)
        }
    }
}

fn runner_config(cli: &Cli, args: &RunArgs) -> anyhow::Result<RunnerConfig> {
    Ok(RunnerConfig {
        scenarios_dir: cli.scenarios.clone(),
        report_dir: args.evidence.clone(),
        driver: DriverConfig {
            base_url: cli.base_url.clone(),
            evidence_dir: args.evidence.clone(),
            browser: args.browser.parse()?,
            headless: !args.headed,
        },
        visual: VisualConfig {
            baseline_dir: args.evidence.join("baselines"),
            evidence_dir: args.evidence.clone(),
            diff_dir: args.evidence.join("diffs"),
            threshold: args.visual_threshold,
            auto_update: args.update_baselines,
        },
        target: args.spawn.as_ref().map(|binary| TargetConfig {
            base_url: cli.base_url.clone(),
            command: Some(binary.clone()),
            health_path: args.health_path.clone(),
            ..Default::default()
        }),
    })
}

async fn run(cli: &Cli, args: RunArgs) -> anyhow::Result<bool> {
    let config = runner_config(cli, &args)?;
    let mut runner = Runner::with_config(config);

    let suite = if let Some(name) = &args.name {
        runner.run_named(name).await?
    } else if let Some(tag) = &args.tag {
        runner.run_tagged(tag).await?
    } else {
        runner.run_all().await?
    };

    if args.update_baselines {
        let scenarios = Scenario::load_all(&cli.scenarios)?;
        let updated = runner.update_baselines(&scenarios)?;
        print_info(&format!("Recorded {} baseline(s)", updated));
    }

    runner.write_report(&suite)?;
    print_suite(&suite, cli.format);

    Ok(suite.failed == 0)
}

fn print_suite(suite: &SuiteReport, format: OutputFormat) {
    let rows: Vec<ResultRow> = suite.scenarios.iter().map(ResultRow::from).collect();
    print_list(&rows, format);

    if suite.failed == 0 {
        print_success(&format!(
            "{} scenario(s) passed in {} ms",
            suite.passed, suite.duration_ms
        ));
    } else {
        print_error(&format!(
            "{} of {} scenario(s) failed",
            suite.failed, suite.total
        ));
    }
}

fn list(cli: &Cli) -> anyhow::Result<bool> {
    let scenarios = Scenario::load_all(&cli.scenarios)?;
    let rows: Vec<ScenarioRow> = scenarios.iter().map(ScenarioRow::from).collect();
    print_list(&rows, cli.format);
    Ok(true)
}

fn baseline(cli: &Cli, cmd: BaselineCommands) -> anyhow::Result<bool> {
    match cmd {
        BaselineCommands::Update { name, evidence } => {
            let mut scenarios = Scenario::load_all(&cli.scenarios)?;
            if let Some(name) = name {
                scenarios.retain(|s| s.name == name);
                if scenarios.is_empty() {
                    anyhow::bail!("scenario not found: {}", name);
                }
            }

            let runner = Runner::with_config(RunnerConfig {
                scenarios_dir: cli.scenarios.clone(),
                visual: VisualConfig {
                    baseline_dir: evidence.join("baselines"),
                    evidence_dir: evidence.clone(),
                    diff_dir: evidence.join("diffs"),
                    ..Default::default()
                },
                ..Default::default()
            });

            let updated = runner.update_baselines(&scenarios)?;
            print_success(&format!("Recorded {} baseline(s)", updated));
            Ok(true)
        }
    }
}

async fn check(cli: &Cli) -> anyhow::Result<bool> {
    let mut ok = true;

    match Driver::check_installed() {
        Ok(()) => print_success("Playwright is installed"),
        Err(e) => {
            print_error(&format!("{}", e));
            ok = false;
        }
    }

    let probe = TargetConfig {
        base_url: cli.base_url.clone(),
        startup_timeout: Duration::from_secs(3),
        ..Default::default()
    };
    match TargetHandle::acquire(probe).await {
        Ok(_) => print_success(&format!("Target is answering at {}", cli.base_url)),
        Err(_) => {
            print_error(&format!("Target is not answering at {}", cli.base_url));
            ok = false;
        }
    }

    Ok(ok)
}

/// Row for `uiproof list`
#[derive(Serialize)]
struct ScenarioRow {
    name: String,
    description: String,
    tags: String,
    steps: usize,
    visual: bool,
}

impl From<&Scenario> for ScenarioRow {
    fn from(s: &Scenario) -> Self {
        Self {
            name: s.name.clone(),
            description: s.description.clone(),
            tags: s.tags.join(", "),
            steps: s.steps.len(),
            visual: s.visual_regression,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["NAME", "DESCRIPTION", "TAGS", "STEPS", "VISUAL"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.description.clone(),
            self.tags.clone(),
            self.steps.to_string(),
            if self.visual { "yes" } else { "no" }.to_string(),
        ]
    }
}

/// Row for `uiproof run` results
#[derive(Serialize)]
struct ResultRow {
    name: String,
    status: String,
    duration_ms: u64,
    failed_step: String,
    error: String,
}

impl From<&uiproof_runner::ScenarioReport> for ResultRow {
    fn from(r: &uiproof_runner::ScenarioReport) -> Self {
        Self {
            name: r.name.clone(),
            status: if r.success { "pass" } else { "fail" }.to_string(),
            duration_ms: r.duration_ms,
            failed_step: r.failed_step.clone().unwrap_or_default(),
            error: r.error.clone().unwrap_or_default(),
        }
    }
}

impl TableDisplay for ResultRow {
    fn headers() -> Vec<&'static str> {
        vec!["SCENARIO", "STATUS", "DURATION", "FAILED STEP", "ERROR"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.status == "pass" {
            "✓ pass".green().to_string()
        } else {
            "✗ fail".red().to_string()
        };
        vec![
            self.name.clone(),
            status,
            format!("{} ms", self.duration_ms),
            self.failed_step.clone(),
            self.error.clone(),
        ]
    }
}
