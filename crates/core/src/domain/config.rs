// Bridge Configuration - the only state persisted across runs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::invocation::Invocation;

/// Persisted configuration
///
/// Unknown fields are ignored and missing fields take their defaults, so
/// older config files keep loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Last script the user ran
    pub last_target: Option<PathBuf>,
    /// Arguments of the last run
    pub last_args: Vec<String>,
    /// Directory holding the wrapped CLI tool
    pub tool_dir: Option<PathBuf>,
    /// Interpreter used for scripts (e.g. `python3`)
    pub interpreter: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Environment variables passed to children; `None` inherits everything
    pub env_allowlist: Option<Vec<String>>,
}

impl BridgeConfig {
    /// Remember a run as the last used target
    pub fn remember(&mut self, invocation: &Invocation) {
        self.last_target = Some(invocation.target.clone());
        self.last_args = invocation.args.clone();
    }

    /// Build an invocation for `target` with the configured defaults applied
    pub fn invocation_for(&self, target: impl Into<PathBuf>, args: Vec<String>) -> Invocation {
        let mut invocation = Invocation::new(target).args(args);
        if let Some(interpreter) = &self.interpreter {
            invocation = invocation.interpreter(interpreter.clone());
        }
        if let Some(secs) = self.timeout_secs {
            invocation = invocation.timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = &self.tool_dir {
            invocation = invocation.in_tool_dir(dir);
        }
        invocation
    }

    /// Invocation repeating the last run, if there was one
    pub fn last_invocation(&self) -> Option<Invocation> {
        self.last_target
            .as_ref()
            .map(|target| self.invocation_for(target.clone(), self.last_args.clone()))
    }
}
