//! Prerequisite HTTP calls and variable substitution
//!
//! Some flows need a fresh remote resource before the browser launches,
//! e.g. creating a job and navigating to its detail page. A setup call
//! posts a JSON body, extracts fields from the response via JSON
//! pointers, and the extracted values replace `{name}` placeholders in
//! the rest of the scenario.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scenario::Scenario;

/// Variables extracted by setup calls, keyed by placeholder name
pub type Vars = BTreeMap<String, String>;

/// A prerequisite HTTP call executed before the browser launches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCall {
    /// HTTP method, POST by default
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute URL of the endpoint
    pub url: String,

    /// JSON request body
    #[serde(default)]
    pub json: Option<Value>,

    /// Response fields to extract: placeholder name to JSON pointer
    #[serde(default)]
    pub save: BTreeMap<String, String>,

    /// Request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Execute setup calls in order, accumulating extracted variables.
///
/// A non-success status or a missing extraction field fails the whole
/// scenario before any browser launches.
pub async fn run_setup(calls: &[SetupCall], vars: &mut Vars) -> Result<()> {
    for call in calls {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(call.timeout_ms))
            .build()?;

        let url = substitute(&call.url, vars);
        info!("Setup call: {} {}", call.method, url);

        let method: reqwest::Method = call
            .method
            .parse()
            .map_err(|_| Error::Setup(format!("invalid method: {}", call.method)))?;

        let mut request = client.request(method, &url);
        if let Some(json) = &call.json {
            request = request.json(json);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Setup(format!("{} returned {}", url, status)));
        }

        if call.save.is_empty() {
            continue;
        }

        let body: Value = response.json().await?;
        for (name, pointer) in &call.save {
            let value = extract(&body, pointer)?;
            debug!("Setup extracted {} = {}", name, value);
            vars.insert(name.clone(), value);
        }
    }

    Ok(())
}

/// Resolve a JSON pointer to a scalar, rendered as a string
pub fn extract(body: &Value, pointer: &str) -> Result<String> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| Error::Setup(format!("response has no field at {}", pointer)))?;

    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Setup(format!(
            "field at {} is not a scalar: {}",
            pointer, other
        ))),
    }
}

/// Replace `{name}` placeholders for every known variable
pub fn substitute(input: &str, vars: &Vars) -> String {
    let mut out = input.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

/// Apply extracted variables to every string in a scenario.
///
/// The scenario round-trips through its JSON representation so URLs,
/// selectors, fixture bodies and init scripts are all covered without
/// field-by-field plumbing.
pub fn apply_vars(scenario: &Scenario, vars: &Vars) -> Result<Scenario> {
    if vars.is_empty() {
        return Ok(scenario.clone());
    }

    let mut value = serde_json::to_value(scenario)?;
    substitute_value(&mut value, vars);
    Ok(serde_json::from_value(value)?)
}

fn substitute_value(value: &mut Value, vars: &Vars) {
    match value {
        Value::String(s) => *s = substitute(s, vars),
        Value::Array(items) => {
            for item in items {
                substitute_value(item, vars);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                substitute_value(item, vars);
            }
        }
        _ => {}
    }
}
