// Session Controller - one active session per presentation window

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::bridge::{ProcessBridge, SessionHandle, TerminateOutcome};
use crate::domain::{BridgeConfig, Invocation};
use crate::error::{BridgeError, Result};
use crate::port::ConfigStore;

/// Owns the current session of a window and the last-used target
///
/// Starting a new run while the current one is active is rejected; the
/// caller has to terminate it first.
pub struct SessionController {
    bridge: Arc<ProcessBridge>,
    config_store: Arc<dyn ConfigStore>,
    current: Option<SessionHandle>,
}

impl SessionController {
    pub fn new(bridge: Arc<ProcessBridge>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            bridge,
            config_store,
            current: None,
        }
    }

    pub fn bridge(&self) -> &ProcessBridge {
        &self.bridge
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// True while the current session's process is alive
    pub fn is_busy(&self) -> bool {
        self.current.as_ref().is_some_and(|s| s.is_running())
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.current {
            Some(session) if session.is_running() => {
                Err(BridgeError::AlreadyRunning(session.id().to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Start a run, replacing the finished previous session
    pub async fn run(&mut self, invocation: Invocation) -> Result<SessionHandle> {
        self.ensure_idle()?;

        let session = self.bridge.start_invocation(invocation.clone()).await?;

        // The run already started; losing the last-used path is not worth failing it
        if let Err(e) = self
            .config_store
            .update(&mut |config: &mut BridgeConfig| config.remember(&invocation))
        {
            warn!(error = %e, "Failed to persist last-used target");
        }

        self.current = Some(session.clone());
        Ok(session)
    }

    /// Start a run of `target` with the configured interpreter, timeout and tool dir
    pub async fn run_target(
        &mut self,
        target: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Result<SessionHandle> {
        let config = self.config_store.load()?;
        let invocation = config.invocation_for(target, args);
        self.run(invocation).await
    }

    /// Repeat the last remembered run
    pub async fn rerun_last(&mut self) -> Result<SessionHandle> {
        let config = self.config_store.load()?;
        let invocation = config
            .last_invocation()
            .ok_or_else(|| BridgeError::Config("no previous run to repeat".to_string()))?;

        info!(target_path = %invocation.target.display(), "Repeating last run");
        self.run(invocation).await
    }

    /// Request termination of the current session, if any
    pub fn terminate_current(&self) -> Option<TerminateOutcome> {
        self.current
            .as_ref()
            .map(|session| self.bridge.terminate(session))
    }

    /// Close the current session
    ///
    /// # Errors
    /// - BridgeError::AlreadyRunning while its process is still alive
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if let Some(session) = self.current.take() {
            info!(session_id = %session.id(), "Session closed");
        }
        Ok(())
    }
}
