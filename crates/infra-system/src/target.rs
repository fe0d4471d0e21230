// Target validation - everything checked before a process is spawned

use procbridge_core::domain::Invocation;
use procbridge_core::port::InvocationError;
use std::path::{Path, PathBuf};

/// Program and argv after validation, ready to hand to the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// A bare name such as `echo` is looked up on PATH; anything with a
/// separator is treated as a path.
fn is_bare_name(path: &Path) -> bool {
    path.components().count() == 1 && !path.is_absolute()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Validate an invocation and resolve its program
///
/// # Errors
/// - InvocationError::NotFound if the target does not exist (or, for a bare
///   name without interpreter, is not on PATH)
/// - InvocationError::NotAFile for directories
/// - InvocationError::NotExecutable when run directly without the execute bit
/// - InvocationError::InterpreterNotFound if the interpreter is not on PATH
/// - InvocationError::WorkingDirNotFound if the working directory is missing
pub fn resolve_target(invocation: &Invocation) -> Result<ResolvedCommand, InvocationError> {
    if let Some(dir) = &invocation.working_dir {
        if !dir.is_dir() {
            return Err(InvocationError::WorkingDirNotFound(dir.clone()));
        }
    }

    let target = &invocation.target;
    let candidate = match &invocation.working_dir {
        Some(dir) if target.is_relative() => dir.join(target),
        _ => target.clone(),
    };

    // A bare name handed to the OS would be searched on PATH, not here
    let script = if candidate.exists() {
        std::path::absolute(&candidate).map_err(|_| InvocationError::NotFound(target.clone()))?
    } else if invocation.interpreter.is_none() && is_bare_name(target) {
        which::which(target).map_err(|_| InvocationError::NotFound(target.clone()))?
    } else {
        return Err(InvocationError::NotFound(target.clone()));
    };

    if !script.is_file() {
        return Err(InvocationError::NotAFile(script));
    }

    let mut resolved = invocation.clone();
    resolved.target = script;

    match &invocation.interpreter {
        Some(interpreter) => {
            let program = which::which(interpreter)
                .map_err(|_| InvocationError::InterpreterNotFound(interpreter.clone()))?;
            resolved.interpreter = Some(program.to_string_lossy().into_owned());
        }
        None => {
            if !is_executable(&resolved.target) {
                return Err(InvocationError::NotExecutable(resolved.target));
            }
        }
    }

    let (program, args) = resolved.command_line();
    Ok(ResolvedCommand {
        program,
        args,
        working_dir: resolved.working_dir,
    })
}
