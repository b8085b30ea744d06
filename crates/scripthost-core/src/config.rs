//! Runtime configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "scripthost.toml";

/// Default delay before the folder watcher restarts after a change pass.
pub const DEFAULT_WATCH_RESTART_DELAY_MS: u64 = 100;

/// Errors raised while reading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the configuration file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Settings consumed by the script runtime.
///
/// Paths other than `root` are vault-relative, `/`-separated.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RuntimeConfig {
    /// Directory backing the content store.
    #[builder(default = "PathBuf::from(\".\")")]
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Folder whose scripts become invocable actions.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub scripts_folder: Option<String>,

    /// Script invoked once the host layout is ready.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub startup_script: Option<String>,

    /// Pause before the watcher re-arms after handling a change.
    #[builder(default = "DEFAULT_WATCH_RESTART_DELAY_MS")]
    #[serde(default = "default_restart_delay")]
    pub watch_restart_delay_ms: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_restart_delay() -> u64 {
    DEFAULT_WATCH_RESTART_DELAY_MS
}

impl RuntimeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl RuntimeConfig {
    /// Create a new config builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Create a config rooted at a directory with nothing configured.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scripts_folder: None,
            startup_script: None,
            watch_restart_delay_ms: DEFAULT_WATCH_RESTART_DELAY_MS,
        }
    }

    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scripthost")
            .join(CONFIG_FILE_NAME)
    }

    /// Parse a config from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Configured scripts folder, ignoring blank values.
    pub fn scripts_folder(&self) -> Option<&str> {
        non_blank(self.scripts_folder.as_deref())
    }

    /// Configured startup script, ignoring blank values.
    pub fn startup_script(&self) -> Option<&str> {
        non_blank(self.startup_script.as_deref())
    }

    /// Restart delay as a [`Duration`].
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_millis(self.watch_restart_delay_ms)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RuntimeConfig::builder()
            .root("/vault")
            .scripts_folder("Scripts")
            .watch_restart_delay_ms(250u64)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/vault"));
        assert_eq!(config.scripts_folder(), Some("Scripts"));
        assert_eq!(config.startup_script(), None);
        assert_eq!(config.watch_restart_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_builder_rejects_empty_root() {
        assert!(RuntimeConfig::builder().root("").build().is_err());
    }

    #[test]
    fn test_blank_settings_are_unset() {
        let mut config = RuntimeConfig::new("/vault");
        config.scripts_folder = Some("   ".into());
        assert_eq!(config.scripts_folder(), None);
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
root = "/vault"
scripts_folder = "Scripts"
startup_script = "Startup.rhai"
"#;
        let config = RuntimeConfig::from_toml(text, Path::new("scripthost.toml")).unwrap();
        assert_eq!(config.startup_script(), Some("Startup.rhai"));
        assert_eq!(config.watch_restart_delay_ms, DEFAULT_WATCH_RESTART_DELAY_MS);
    }
}
