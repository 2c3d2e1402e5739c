//! Error types for the verification runner

use thiserror::Error;

/// Result type alias using the runner [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Verification runner error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Target failed to start: {0}")]
    TargetStartup(String),

    #[error("Target health check failed after {0} attempts")]
    TargetHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Invalid route pattern '{pattern}': {reason}")]
    RoutePattern { pattern: String, reason: String },

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Setup call failed: {0}")]
    Setup(String),

    #[error("Visual comparison error: {0}")]
    Visual(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
