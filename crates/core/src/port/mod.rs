// Port Layer - Interfaces for external dependencies

pub mod config_store;
pub mod id_provider; // For deterministic testing
pub mod process_launcher;
pub mod terminate;
pub mod time_provider;

// Re-exports
pub use config_store::ConfigStore;
pub use id_provider::IdProvider;
pub use process_launcher::{InputSink, InvocationError, ProcessHandle, ProcessLauncher};
pub use terminate::{terminate_channel, TerminateSender, TerminateToken};
pub use time_provider::TimeProvider;
