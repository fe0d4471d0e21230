// Domain Layer - Pure session model, no I/O

pub mod config;
pub mod error;
pub mod invocation;
pub mod output;
pub mod session;

// Re-exports
pub use config::BridgeConfig;
pub use error::DomainError;
pub use invocation::Invocation;
pub use output::{OutputBuffer, OutputChunk, OutputFragment, StreamKind, Utf8Decoder};
pub use session::{ExitOutcome, ExitReport, Session, SessionId, SessionState};
