// Bridge constants (no magic values)
use std::time::Duration;

/// Capacity of the output channel between pipe readers and the presentation layer.
/// When full, readers stop reading and the child blocks on its pipe.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Bytes requested per pipe read (4 KiB)
pub const READ_BUFFER_SIZE: usize = 4096;

/// Time a process gets to exit after SIGTERM before SIGKILL (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long pipe readers may keep draining after the child exited (2 seconds).
/// A detached grandchild can hold the pipes open indefinitely.
pub const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout when a tool is run to completion (30 seconds)
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);
