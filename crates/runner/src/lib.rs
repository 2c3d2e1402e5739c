//! uiproof verification runner
//!
//! Executes declarative browser-verification scenarios against locally
//! running web applications: launch a browser, perform a linear sequence
//! of navigation/interaction/assertion steps, persist screenshot
//! evidence, and report pass/fail through the process exit status.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Verification Runner (Rust)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runner                                                     │
//! │    ├── ensure_target()  -> TargetHandle (probe or spawn)    │
//! │    ├── run_setup()      -> extracted {vars}                 │
//! │    ├── Driver::run()    -> one Node/Playwright script       │
//! │    └── VisualChecker    -> baseline diffs                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── routes: mocked fixtures (last registration wins)     │
//! │    ├── setup: prerequisite HTTP calls                       │
//! │    ├── steps: [navigate | click | fill | wait | assert      │
//! │    │           | screenshot | mock_route | ...]             │
//! │    └── visual_regression: bool                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Execution is strictly linear: a thrown step aborts everything after
//! it, there are no retries, and every run overwrites the previous
//! run's evidence at the same deterministic paths.

pub mod driver;
pub mod error;
pub mod routes;
pub mod runner;
pub mod scenario;
pub mod setup;
pub mod target;
pub mod visual;

pub use driver::{Browser, Driver, DriverConfig, StepOutcome};
pub use error::{Error, Result};
pub use runner::{Runner, RunnerConfig, ScenarioReport, SuiteReport};
pub use scenario::{Scenario, Step};
