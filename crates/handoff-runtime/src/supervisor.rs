//! Mode supervisor.
//!
//! An explicit two-state machine over the drivers. Exactly one driver is
//! active at a time by construction: each loop iteration builds the driver
//! for the current mode, runs it to completion, and only then considers the
//! next transition. Every transition (including the first) refreshes the
//! upstream keep-alive and appends a mode-switch marker to the event log.

use std::sync::Arc;

use tracing::info;

use handoff_core::{ExecutionMode, SessionEvent};
use handoff_rpc::MethodRegistry;
use handoff_session::Session;

use crate::backend::AgentBackend;
use crate::launcher::AgentLauncher;
use crate::local::LocalModeDriver;
use crate::prompt::ConfirmPrompt;
use crate::remote::RemoteModeDriver;
use crate::scanner::ScannerFactory;
use crate::types::DriverOutcome;

/// Collaborators shared by every driver the supervisor builds.
pub struct SupervisorDeps {
    /// RPC method registry the active driver arms.
    pub registry: Arc<MethodRegistry>,
    /// Hosted backend for remote mode.
    pub backend: Arc<dyn AgentBackend>,
    /// Subprocess launcher for local mode.
    pub launcher: Arc<dyn AgentLauncher>,
    /// Transcript scanner factory for local mode.
    pub scanners: Arc<dyn ScannerFactory>,
    /// Discard confirmation prompt for local takeover.
    pub prompt: Arc<dyn ConfirmPrompt>,
    /// Agent binary for local spawns.
    pub program: String,
}

/// Alternate drivers until one decides the session is over.
pub async fn run_supervisor(
    session: Arc<Session>,
    deps: SupervisorDeps,
    start_mode: ExecutionMode,
) {
    let mut mode = start_mode;
    loop {
        info!(mode = mode.as_str(), "entering execution mode");
        session.sync().keep_alive(mode).await;
        session
            .sync()
            .send_session_event(SessionEvent::SwitchMode { mode })
            .await;

        let outcome = match mode {
            ExecutionMode::Remote => {
                RemoteModeDriver::new(
                    Arc::clone(&session),
                    Arc::clone(&deps.registry),
                    Arc::clone(&deps.backend),
                )
                .run()
                .await
            }
            ExecutionMode::Local => {
                LocalModeDriver::new(
                    Arc::clone(&session),
                    Arc::clone(&deps.registry),
                    Arc::clone(&deps.launcher),
                    Arc::clone(&deps.scanners),
                    Arc::clone(&deps.prompt),
                )
                .with_program(deps.program.clone())
                .run()
                .await
            }
        };

        match outcome {
            DriverOutcome::Switch => {
                mode = match mode {
                    ExecutionMode::Remote => ExecutionMode::Local,
                    ExecutionMode::Local => ExecutionMode::Remote,
                };
            }
            DriverOutcome::Exit => {
                info!("session finished");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use handoff_session::SessionConfig;

    use crate::testutil::{
        FakeBackend, FakeLauncher, FakePrompt, FakeScannerFactory, FakeSync, LaunchScript,
    };

    fn deps(launcher_script: Vec<LaunchScript>) -> SupervisorDeps {
        SupervisorDeps {
            registry: Arc::new(MethodRegistry::new()),
            backend: Arc::new(FakeBackend::default()),
            launcher: Arc::new(FakeLauncher::scripted(launcher_script)),
            scanners: Arc::new(FakeScannerFactory::default()),
            prompt: Arc::new(FakePrompt::answering(true)),
            program: "claude".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn alternates_from_remote_until_local_exit() {
        let sync = Arc::new(FakeSync::default());
        // Terminal upstream store: the remote driver ends immediately and
        // hands over to local, whose clean exit finishes the session.
        *sync.metadata_terminal.lock() = true;
        let session = Arc::new(Session::new(SessionConfig::default(), sync.clone()));

        run_supervisor(
            Arc::clone(&session),
            deps(vec![LaunchScript::CleanExit]),
            ExecutionMode::Remote,
        )
        .await;

        assert_eq!(
            *sync.keep_alives.lock(),
            vec![ExecutionMode::Remote, ExecutionMode::Local]
        );
        let switches: Vec<ExecutionMode> = sync
            .events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::SwitchMode { mode } => Some(*mode),
                _ => None,
            })
            .collect();
        assert_eq!(switches, vec![ExecutionMode::Remote, ExecutionMode::Local]);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_in_local_when_requested() {
        let sync = Arc::new(FakeSync::default());
        let session = Arc::new(Session::new(SessionConfig::default(), sync.clone()));

        run_supervisor(
            Arc::clone(&session),
            deps(vec![LaunchScript::CleanExit]),
            ExecutionMode::Local,
        )
        .await;

        assert_eq!(*sync.keep_alives.lock(), vec![ExecutionMode::Local]);
    }

    #[tokio::test(start_paused = true)]
    async fn local_switch_returns_to_remote() {
        let sync = Arc::new(FakeSync::default());
        let session = Arc::new(Session::new(SessionConfig::default(), sync.clone()));
        let deps = deps(vec![LaunchScript::BlockUntilCancel, LaunchScript::CleanExit]);
        let registry = Arc::clone(&deps.registry);

        let run = tokio::spawn(run_supervisor(
            Arc::clone(&session),
            deps,
            ExecutionMode::Local,
        ));

        // First local run: a queued remote message hands control back.
        tokio::task::yield_now().await;
        session
            .queue()
            .push("from another device", handoff_core::PermissionMode::Default);

        // Remote consumes the batch (scriptless backend blocks, so abort it),
        // then switch back to local, which exits cleanly.
        while sync.keep_alives.lock().len() < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        let _ = registry
            .dispatch(handoff_rpc::RpcRequest {
                id: "1".into(),
                method: "abort".into(),
                params: None,
            })
            .await;
        let _ = registry
            .dispatch(handoff_rpc::RpcRequest {
                id: "2".into(),
                method: "switch".into(),
                params: None,
            })
            .await;

        run.await.unwrap();
        assert_eq!(
            *sync.keep_alives.lock(),
            vec![
                ExecutionMode::Local,
                ExecutionMode::Remote,
                ExecutionMode::Local,
            ]
        );
    }
}
