//! The application under verification
//!
//! Scenarios normally assume an already-running app and only probe its
//! base URL until it answers. The runner can also own the app for the
//! duration of a run: spawn a binary, health-check it, and tear it down
//! with SIGTERM then kill.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Configuration for reaching or spawning the application under test
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Base URL scenarios run against
    pub base_url: String,

    /// Binary to spawn; when None the app must already be running
    pub command: Option<PathBuf>,

    /// Arguments for the spawned binary
    pub args: Vec<String>,

    /// Extra environment for the spawned binary
    pub env: Vec<(String, String)>,

    /// Environment variable carrying the listen port to the binary
    pub port_env: String,

    /// Fixed port; None picks a free one when spawning
    pub port: Option<u16>,

    /// Path probed for readiness
    pub health_path: String,

    /// How long to wait for the target to answer
    pub startup_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            command: None,
            args: Vec::new(),
            env: Vec::new(),
            port_env: "PORT".to_string(),
            port: None,
            health_path: "/".to_string(),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle to the application under test
pub struct TargetHandle {
    child: Option<Child>,
    base_url: String,
}

impl TargetHandle {
    /// Reach the target: spawn it when configured with a command,
    /// then wait until its health path answers.
    pub async fn acquire(config: TargetConfig) -> Result<Self> {
        let (child, base_url) = match &config.command {
            Some(binary) => {
                let port = config.port.unwrap_or_else(find_free_port);
                let base_url = format!("http://127.0.0.1:{}", port);

                info!("Spawning target {} on port {}", binary.display(), port);

                let mut cmd = Command::new(binary);
                cmd.args(&config.args)
                    .env(&config.port_env, port.to_string())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
                for (key, value) in &config.env {
                    cmd.env(key, value);
                }

                let child = cmd.spawn().map_err(|e| {
                    Error::TargetStartup(format!("failed to spawn {}: {}", binary.display(), e))
                })?;

                (Some(child), base_url)
            }
            None => (None, config.base_url.clone()),
        };

        let handle = TargetHandle { child, base_url };
        handle
            .wait_for_healthy(&config.health_path, config.startup_timeout)
            .await?;

        info!("Target is answering at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll the health path until it answers or the timeout elapses
    async fn wait_for_healthy(&self, health_path: &str, timeout: Duration) -> Result<()> {
        let health_url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            health_path.trim_start_matches('/')
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health probe returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for target at {}...", health_url);
                    }
                    // Connection refused is expected while the target starts
                    if !e.is_connect() {
                        warn!("Health probe error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(Error::TargetHealthCheck(attempts))
    }

    /// Base URL scenarios should run against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop a spawned target; a no-op for already-running apps
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!("Stopping target (pid: {})", child.id());

        // Graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for TargetHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Find a free port to use
fn find_free_port() -> u16 {
    use std::net::TcpListener;

    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to find free port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port1 = find_free_port();
        let port2 = find_free_port();

        // Ports should be in valid range
        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[tokio::test]
    async fn probe_of_absent_target_fails() {
        let port = find_free_port();
        let config = TargetConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            startup_timeout: Duration::from_millis(300),
            ..Default::default()
        };

        match TargetHandle::acquire(config).await {
            Err(Error::TargetHealthCheck(attempts)) => assert!(attempts >= 1),
            other => panic!("expected health check failure, got {:?}", other.map(|h| h.base_url().to_string())),
        }
    }
}
