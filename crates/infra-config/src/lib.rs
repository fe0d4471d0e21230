// ProcBridge Infrastructure - Config Adapter
// Implements: ConfigStore

mod json_store;

pub use json_store::{default_config_path, JsonConfigStore, CONFIG_PATH_ENV};
