// JSON Config Store

use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use procbridge_core::domain::BridgeConfig;
use procbridge_core::error::{BridgeError, Result};
use procbridge_core::port::ConfigStore;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "PROCBRIDGE_CONFIG";

const CONFIG_FILE_NAME: &str = "config.json";

/// `$PROCBRIDGE_CONFIG` if set, else `config.json` in the platform config dir
pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).into_owned()));
    }

    ProjectDirs::from("", "", "procbridge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or_else(|| BridgeError::Config("cannot determine a home directory".to_string()))
}

/// Config store backed by one pretty-printed JSON file
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location
    pub fn open_default() -> Result<Self> {
        default_config_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<BridgeConfig> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file yet, using defaults");
                return Ok(BridgeConfig::default());
            }
            Err(e) => return Err(BridgeError::Io(e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            BridgeError::Config(format!("invalid config file {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, config: &BridgeConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename, so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}
