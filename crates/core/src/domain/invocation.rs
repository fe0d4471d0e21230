// Invocation - what to launch and how

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{DomainError, Result};

/// Full description of one process launch
///
/// Built with chained setters:
///
/// ```
/// use procbridge_core::domain::Invocation;
/// use std::time::Duration;
///
/// let invocation = Invocation::new("sysmo_isim_sja2.py")
///     .arg("--help")
///     .interpreter("python3")
///     .timeout(Duration::from_secs(30));
/// assert_eq!(invocation.args, vec!["--help".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub target: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Program that runs `target` as its first argument (e.g. `python3`)
    pub interpreter: Option<String>,
    pub timeout: Option<Duration>,
    /// Extra variables set on top of the launcher's environment policy
    pub env: HashMap<String, String>,
}

impl Invocation {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            working_dir: None,
            interpreter: None,
            timeout: None,
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve a relative target against the tool directory
    ///
    /// Absolute targets are left alone. The tool directory also becomes the
    /// working directory unless one was set explicitly.
    pub fn in_tool_dir(mut self, tool_dir: &Path) -> Self {
        if self.target.is_relative() {
            self.target = tool_dir.join(&self.target);
        }
        if self.working_dir.is_none() {
            self.working_dir = Some(tool_dir.to_path_buf());
        }
        self
    }

    /// Reject invocations that can never be launched, before touching the OS
    pub fn validate(&self) -> Result<()> {
        if self.target.as_os_str().is_empty() {
            return Err(DomainError::ValidationError("target path is empty".into()));
        }
        if matches!(&self.interpreter, Some(i) if i.trim().is_empty()) {
            return Err(DomainError::ValidationError("interpreter is empty".into()));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(DomainError::ValidationError("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Program and argv as handed to the OS
    pub fn command_line(&self) -> (String, Vec<String>) {
        let target = self.target.to_string_lossy().into_owned();
        match &self.interpreter {
            Some(interpreter) => {
                let mut argv = Vec::with_capacity(self.args.len() + 1);
                argv.push(target);
                argv.extend(self.args.iter().cloned());
                (interpreter.clone(), argv)
            }
            None => (target, self.args.clone()),
        }
    }
}
