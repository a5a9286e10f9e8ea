//! Supervision of the external proxy engine process

use crate::key::config::LaunchConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Name of the proxy engine binary
pub const ENGINE_BINARY: &str = "sing-box";

/// Longest diagnostic excerpt captured from a crashed engine
const MAX_DIAGNOSTIC_CHARS: usize = 200;

/// How long a signalled engine gets to exit on its own
#[cfg(unix)]
const TERM_WAIT: Duration = Duration::from_secs(1);

/// How long to wait for a killed engine to exit
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Errors from launching or supervising the engine process
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine binary not found: {0}")]
    NotFound(#[from] which::Error),
    #[error("failed to serialize launch config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write launch config: {0}")]
    WriteConfig(#[source] std::io::Error),
    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine exited during startup: {0}")]
    Crashed(String),
}

/// Locate the engine binary on PATH, or verify an explicit override
pub fn locate_engine(path: Option<&Path>) -> Result<PathBuf, EngineError> {
    match path {
        Some(path) => Ok(which::which(path)?),
        None => Ok(which::which(ENGINE_BINARY)?),
    }
}

/// Ask the engine for its version line
pub async fn engine_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary).arg("version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().next().map(|line| line.trim().to_string())
}

/// A running engine instance bound to one local port
///
/// The child is killed and its config file removed on stop; Drop covers the
/// paths where stop never runs.
#[derive(Debug)]
pub struct EngineProcess {
    child: Option<Child>,
    config_path: PathBuf,
}

impl EngineProcess {
    /// Spawn the engine for one launch config and wait out the startup grace
    /// period
    ///
    /// Fails when the process cannot start or exits before the grace period
    /// ends; an early exit carries a bounded stderr excerpt.
    pub async fn start(
        binary: &Path,
        config: &LaunchConfig,
        local_port: u16,
        startup_grace: Duration,
    ) -> Result<Self, EngineError> {
        let config_path = std::env::temp_dir().join(format!(
            "keycheck-{}-{}.json",
            std::process::id(),
            local_port
        ));
        let payload = serde_json::to_string(config)?;
        tokio::fs::write(&config_path, payload)
            .await
            .map_err(EngineError::WriteConfig)?;

        let spawned = Command::new(binary)
            .arg("run")
            .arg("-c")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = std::fs::remove_file(&config_path);
                return Err(EngineError::Spawn(e));
            }
        };

        tokio::time::sleep(startup_grace).await;

        match child.try_wait() {
            Ok(None) => Ok(Self {
                child: Some(child),
                config_path,
            }),
            Ok(Some(status)) => {
                let diagnostic = Self::read_diagnostic(&mut child).await;
                let _ = std::fs::remove_file(&config_path);
                debug!("engine exited during startup with {}: {}", status, diagnostic);
                Err(EngineError::Crashed(diagnostic))
            }
            Err(e) => {
                let _ = child.start_kill();
                let _ = std::fs::remove_file(&config_path);
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Stop the engine and remove its config file
    ///
    /// Asks the process to exit with SIGTERM first; a hard kill follows only
    /// when it is still alive after the grace window.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if !Self::terminate_gracefully(&mut child).await {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill engine: {}", e);
                }
                let _ = tokio::time::timeout(KILL_WAIT, child.wait()).await;
            }
        }
        let _ = std::fs::remove_file(&self.config_path);
    }

    #[cfg(unix)]
    async fn terminate_gracefully(child: &mut Child) -> bool {
        let pid = match child.id() {
            Some(pid) => pid,
            // id() is None once the child has been reaped
            None => return true,
        };
        let _ = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        tokio::time::timeout(TERM_WAIT, child.wait()).await.is_ok()
    }

    #[cfg(not(unix))]
    async fn terminate_gracefully(_child: &mut Child) -> bool {
        false
    }

    async fn read_diagnostic(child: &mut Child) -> String {
        let mut text = String::new();
        if let Some(stderr) = child.stderr.as_mut() {
            let _ = stderr.read_to_string(&mut text).await;
        }
        let excerpt: String = text.trim().chars().take(MAX_DIAGNOSTIC_CHARS).collect();
        if excerpt.is_empty() {
            "no diagnostic output".to_string()
        } else {
            excerpt
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        let _ = std::fs::remove_file(&self.config_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::translator::translate;

    fn launch_config(port: u16) -> LaunchConfig {
        let outbound = translate("ss://bm9wZTpwYXNz@127.0.0.1:9#t").unwrap();
        LaunchConfig::new(outbound, port)
    }

    fn config_file(port: u16) -> PathBuf {
        std::env::temp_dir().join(format!("keycheck-{}-{}.json", std::process::id(), port))
    }

    #[test]
    fn test_locate_engine_missing_binary() {
        assert!(locate_engine(Some(Path::new("/nonexistent/keycheck-engine"))).is_err());
    }

    #[test]
    fn test_locate_engine_with_override() {
        let found = locate_engine(Some(Path::new("/bin/sh"))).unwrap();
        assert_eq!(found, PathBuf::from("/bin/sh"));
    }

    #[tokio::test]
    async fn test_engine_version_of_silent_binary() {
        // `true` accepts any args and prints nothing
        assert!(engine_version(Path::new("/bin/true")).await.is_none());
    }

    #[tokio::test]
    async fn test_start_reports_early_exit() {
        // `false` exits immediately regardless of args
        let err = EngineProcess::start(
            Path::new("/bin/false"),
            &launch_config(21001),
            21001,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Crashed(_)));
        assert!(!config_file(21001).exists());
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_binary() {
        let err = EngineProcess::start(
            Path::new("/nonexistent/keycheck-engine"),
            &launch_config(21002),
            21002,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Spawn(_)));
        assert!(!config_file(21002).exists());
    }

    #[tokio::test]
    async fn test_stop_kills_running_engine_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut engine = EngineProcess::start(
            &script,
            &launch_config(21003),
            21003,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        engine.stop().await;
        assert!(!config_file(21003).exists());
    }

    #[tokio::test]
    async fn test_stop_signals_before_killing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("term-seen");
        let script = dir.path().join("engine.sh");
        // `wait` is interruptible, so the trap runs as soon as the signal
        // lands instead of after the sleep
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ntrap 'touch {}; exit 0' TERM\nsleep 5 &\nwait $!\n",
                marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut engine = EngineProcess::start(
            &script,
            &launch_config(21004),
            21004,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        engine.stop().await;

        assert!(marker.exists());
        assert!(!config_file(21004).exists());
    }
}
