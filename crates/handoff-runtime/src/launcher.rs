//! Local agent process launcher.
//!
//! [`ClaudeLauncher`] is the real implementation over
//! `tokio::process::Command`. The launch future completes only after the
//! process has fully exited: on cancellation the child is killed and reaped
//! before the future resolves, so an abort caller that awaits the launch
//! knows the subprocess is gone.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::LaunchError;

/// Everything needed to spawn one agent process.
#[derive(Clone, Debug)]
pub struct LaunchConfig {
    /// Binary to execute.
    pub program: String,
    /// Arguments, permission flags already applied.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: String,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Tool allow-list, mapped to the CLI's `--allowedTools`.
    pub allowed_tools: Vec<String>,
    /// Hook settings file, mapped to `--settings`.
    pub settings_path: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: "claude".into(),
            args: Vec::new(),
            cwd: ".".into(),
            env: HashMap::new(),
            allowed_tools: Vec::new(),
            settings_path: None,
        }
    }
}

/// Result of one completed spawn cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchExit {
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Whether the process was terminated through the cancellation signal.
    pub cancelled: bool,
}

/// Supervises one agent subprocess from spawn to full exit.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Spawn the process and wait for it to fully exit.
    ///
    /// Cancellation terminates the child and still reaps it before
    /// returning. A non-zero exit status is an error (recoverable: the
    /// caller reports and retries).
    async fn launch(
        &self,
        config: LaunchConfig,
        cancel: CancellationToken,
    ) -> Result<LaunchExit, LaunchError>;
}

/// Real subprocess launcher backed by `tokio::process::Command`.
pub struct ClaudeLauncher;

#[async_trait]
impl AgentLauncher for ClaudeLauncher {
    async fn launch(
        &self,
        config: LaunchConfig,
        cancel: CancellationToken,
    ) -> Result<LaunchExit, LaunchError> {
        let mut cmd = tokio::process::Command::new(&config.program);
        let _ = cmd
            .args(&config.args)
            .current_dir(&config.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if !config.allowed_tools.is_empty() {
            let _ = cmd.arg("--allowedTools").arg(config.allowed_tools.join(","));
        }
        if let Some(settings) = &config.settings_path {
            let _ = cmd.arg("--settings").arg(settings);
        }
        for (key, value) in &config.env {
            let _ = cmd.env(key, value);
        }

        debug!(program = %config.program, cwd = %config.cwd, "spawning agent process");

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn { source })?;

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| LaunchError::Wait { source })?,
            () = cancel.cancelled() => {
                debug!("agent process cancelled, killing");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to kill agent process");
                }
                // Reap fully so the caller can rely on "exited" meaning exited.
                let _ = child.wait().await.map_err(|source| LaunchError::Wait { source })?;
                return Ok(LaunchExit {
                    exit_code: None,
                    cancelled: true,
                });
            }
        };

        let code = status.code().unwrap_or(-1);
        debug!(exit_code = code, "agent process exited");
        if code == 0 {
            Ok(LaunchExit {
                exit_code: Some(0),
                cancelled: false,
            })
        } else {
            Err(LaunchError::Exited { code })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn sh(script: &str) -> LaunchConfig {
        LaunchConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: "/tmp".into(),
            ..LaunchConfig::default()
        }
    }

    #[tokio::test]
    async fn clean_exit() {
        let exit = ClaudeLauncher
            .launch(sh("exit 0"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(exit.exit_code, Some(0));
        assert!(!exit.cancelled);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = ClaudeLauncher
            .launch(sh("exit 7"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, LaunchError::Exited { code: 7 });
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let config = LaunchConfig {
            program: "/nonexistent/agent-binary".into(),
            cwd: "/tmp".into(),
            ..LaunchConfig::default()
        };
        let err = ClaudeLauncher
            .launch(config, CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, LaunchError::Spawn { .. });
    }

    #[tokio::test]
    async fn cancellation_kills_and_reaps() {
        let cancel = CancellationToken::new();
        let killer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let exit = ClaudeLauncher.launch(sh("sleep 30"), cancel).await.unwrap();
        assert!(exit.cancelled);
        assert_eq!(exit.exit_code, None);
        killer.await.unwrap();
    }

    #[tokio::test]
    async fn env_is_injected() {
        let mut config = sh("test \"$HANDOFF_TEST_VAR\" = set");
        let _ = config.env.insert("HANDOFF_TEST_VAR".into(), "set".into());
        let exit = ClaudeLauncher
            .launch(config, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(exit.exit_code, Some(0));
    }
}
