// Config Store Port (Interface)

use crate::domain::BridgeConfig;
use crate::error::Result;

/// Persistence for the bridge configuration
///
/// Synchronous: the file is tiny and only touched when a run starts.
pub trait ConfigStore: Send + Sync {
    /// Load the configuration; a store that has never been saved yields the default
    fn load(&self) -> Result<BridgeConfig>;

    /// Replace the stored configuration
    fn save(&self, config: &BridgeConfig) -> Result<()>;

    /// Load, apply `edit`, save; returns the saved configuration
    fn update(&self, edit: &mut dyn FnMut(&mut BridgeConfig)) -> Result<BridgeConfig> {
        let mut config = self.load()?;
        edit(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}

pub mod mocks {
    use super::*;
    use crate::error::BridgeError;
    use parking_lot::Mutex;

    /// In-memory store; can be told to fail saves
    #[derive(Default)]
    pub struct InMemoryConfigStore {
        config: Mutex<BridgeConfig>,
        fail_saves: bool,
        saves: Mutex<usize>,
    }

    impl InMemoryConfigStore {
        pub fn new(config: BridgeConfig) -> Self {
            Self {
                config: Mutex::new(config),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_saves: true,
                ..Default::default()
            }
        }

        pub fn save_count(&self) -> usize {
            *self.saves.lock()
        }

        pub fn current(&self) -> BridgeConfig {
            self.config.lock().clone()
        }
    }

    impl ConfigStore for InMemoryConfigStore {
        fn load(&self) -> Result<BridgeConfig> {
            Ok(self.config.lock().clone())
        }

        fn save(&self, config: &BridgeConfig) -> Result<()> {
            if self.fail_saves {
                return Err(BridgeError::Config("read-only store".into()));
            }
            *self.config.lock() = config.clone();
            *self.saves.lock() += 1;
            Ok(())
        }
    }
}
