//! Live runtime settings shared between components.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use scripthost_core::{RuntimeConfig, Value};

/// Current configuration, replaced whenever settings are applied.
#[derive(Debug)]
pub struct Settings {
    config: RwLock<RuntimeConfig>,
}

impl Settings {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RuntimeConfig {
        self.read().clone()
    }

    pub fn replace(&self, config: RuntimeConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn scripts_folder(&self) -> Option<String> {
        self.read().scripts_folder().map(str::to_string)
    }

    pub fn startup_script(&self) -> Option<String> {
        self.read().startup_script().map(str::to_string)
    }

    pub fn restart_delay(&self) -> Duration {
        self.read().watch_restart_delay()
    }

    /// Application context handed to script functions.
    pub fn app_context(&self) -> Value {
        let config = self.read();
        let mut app = HashMap::new();
        app.insert(
            "root".to_string(),
            Value::from(config.root.to_string_lossy().to_string()),
        );
        app.insert(
            "scripts_folder".to_string(),
            Value::from(config.scripts_folder()),
        );
        app.insert(
            "startup_script".to_string(),
            Value::from(config.startup_script()),
        );
        Value::Object(app)
    }

    fn read(&self) -> RwLockReadGuard<'_, RuntimeConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
