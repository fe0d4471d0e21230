// Session Id Port

use crate::domain::SessionId;

/// Source of session ids; swapped for a counter in tests
pub trait IdProvider: Send + Sync {
    fn generate_id(&self) -> SessionId;
}

/// Random v4 UUIDs
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> SessionId {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Hands out session-1, session-2, ...
    #[derive(Default)]
    pub struct SequentialIdProvider {
        next: AtomicU64,
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> SessionId {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            format!("session-{}", n)
        }
    }
}
