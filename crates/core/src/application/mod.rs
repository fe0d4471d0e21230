// Application Layer - Use Cases

pub mod bridge;
pub mod constants;
pub mod controller;

// Re-exports
pub use bridge::{CapturedRun, OutputStream, PollOutcome, ProcessBridge, SessionHandle, TerminateOutcome};
pub use controller::SessionController;
