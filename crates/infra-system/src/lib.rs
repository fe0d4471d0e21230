// ProcBridge Infrastructure - System Adapters
// Implements: ProcessLauncher, target validation, tool discovery

pub mod discovery;
pub mod subprocess_launcher;
pub mod target;

pub use discovery::locate_tool_dir;
pub use subprocess_launcher::{EnvPolicy, SubprocessLauncher};
pub use target::resolve_target;
