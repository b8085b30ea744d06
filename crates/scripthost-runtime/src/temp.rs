//! Registry of temporary extensions created by scripts at runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use scripthost_core::ScriptResult;
use scripthost_host::{Action, ActionRegistry, HostServices, Reporter, StyleHandle, StyleHost};

use crate::module::{ExtensionClass, ExtensionManifest, HostExtension};

/// Prefix of temporary extension ids.
pub const TEMP_EXTENSION_PREFIX: &str = "__temp-plugin-";

/// Prefix of the actions that unload a temporary extension.
pub const UNREGISTER_ACTION_PREFIX: &str = "unregister-temp-plugin-";

/// Name used for classes that do not declare one.
pub const ANONYMOUS_CLASS_NAME: &str = "_AnonymousPlugin";

struct TempEntry {
    class_name: String,
    serial: u64,
    extension: Box<dyn HostExtension>,
    action_id: String,
    style: Option<StyleHandle>,
}

/// Tracks live temporary extensions by id and guarantees their teardown
/// removes the entry, its unload action and its style.
pub struct TempExtensionRegistry {
    actions: Arc<dyn ActionRegistry>,
    styles: Arc<dyn StyleHost>,
    reporter: Reporter,
    entries: Mutex<HashMap<String, TempEntry>>,
    next_serial: AtomicU64,
}

impl TempExtensionRegistry {
    pub fn new(services: &HostServices) -> Self {
        Self {
            actions: Arc::clone(&services.actions),
            styles: Arc::clone(&services.styles),
            reporter: services.reporter(),
            entries: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(0),
        }
    }

    /// Id a class is tracked under.
    pub fn extension_id(class: &dyn ExtensionClass) -> (String, String) {
        let class_name = class
            .class_name()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_CLASS_NAME.to_string());
        (format!("{TEMP_EXTENSION_PREFIX}{class_name}"), class_name)
    }

    /// Instantiate and load an extension, replacing any live instance with
    /// the same id. Returns the extension id.
    ///
    /// Failures are reported and leave nothing tracked.
    pub async fn register(
        self: &Arc<Self>,
        class: Arc<dyn ExtensionClass>,
        style: Option<String>,
    ) -> ScriptResult<String> {
        let (id, class_name) = Self::extension_id(class.as_ref());

        let existing = self.lock().get(&id).map(|entry| entry.serial);
        if let Some(serial) = existing {
            self.unload(&id, serial);
        }

        let manifest = ExtensionManifest::for_class(&id, &class_name);
        let extension = match self.instantiate(class.as_ref(), &manifest).await {
            Ok(extension) => extension,
            Err(e) => {
                self.reporter
                    .failure(&format!("Error loading temp plugin {class_name}"), &e);
                return Err(e);
            }
        };
        self.reporter.info(format!("Loaded temp plugin: {class_name}"));

        let style = style.map(|css| self.styles.inject(&id, &css));
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let action_id = format!("{UNREGISTER_ACTION_PREFIX}{class_name}");
        let action = self.unload_action(&action_id, &class_name, &id, serial);

        self.lock().insert(
            id.clone(),
            TempEntry {
                class_name: class_name.clone(),
                serial,
                extension,
                action_id,
                style,
            },
        );

        if let Err(e) = self.actions.add_action(action) {
            self.reporter
                .failure(&format!("Error registering unload command for {class_name}"), &e);
            self.unload(&id, serial);
            return Err(e);
        }

        tracing::info!(target: "scripthost::temp", id = %id, serial, "Temp extension registered");
        Ok(id)
    }

    /// Unload the instance registered under `id`, if it is still the one
    /// identified by `serial`. Returns whether anything was unloaded.
    pub fn unload(&self, id: &str, serial: u64) -> bool {
        let entry = {
            let mut entries = self.lock();
            match entries.get(id) {
                Some(entry) if entry.serial == serial => entries.remove(id),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            return false;
        };

        if let Err(e) = entry.extension.unload() {
            self.reporter
                .failure(&format!("Error unloading temp plugin {}", entry.class_name), &e);
        }
        self.actions.remove_action(&entry.action_id);
        self.reporter
            .info(format!("Unregistered temp plugin: {}", entry.class_name));
        if let Some(style) = entry.style {
            self.styles.remove(style);
        }

        tracing::info!(target: "scripthost::temp", id, serial, "Temp extension unloaded");
        true
    }

    /// Unload every live instance.
    pub fn unload_all(&self) -> usize {
        let live: Vec<(String, u64)> = self
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.serial))
            .collect();

        live.iter()
            .filter(|(id, serial)| self.unload(id, *serial))
            .count()
    }

    /// Unload the instance of a class by its declared name.
    pub fn unregister_by_class_name(&self, class_name: &str) -> bool {
        let id = format!("{TEMP_EXTENSION_PREFIX}{class_name}");
        let serial = self.lock().get(&id).map(|entry| entry.serial);
        match serial {
            Some(serial) => self.unload(&id, serial),
            None => {
                self.reporter
                    .info(format!("Temp plugin {class_name} was not registered"));
                false
            }
        }
    }

    /// Ids of live instances, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Unload action id of a live instance.
    pub fn action_id(&self, id: &str) -> Option<String> {
        self.lock().get(id).map(|entry| entry.action_id.clone())
    }

    async fn instantiate(
        &self,
        class: &dyn ExtensionClass,
        manifest: &ExtensionManifest,
    ) -> ScriptResult<Box<dyn HostExtension>> {
        let extension = class.instantiate(manifest)?;
        extension.load().await?;
        Ok(extension)
    }

    fn unload_action(self: &Arc<Self>, action_id: &str, class_name: &str, id: &str, serial: u64) -> Action {
        let registry: Weak<Self> = Arc::downgrade(self);
        let id = id.to_string();

        Action::new(
            action_id,
            format!("Unregister temp plugin: {class_name}"),
            "unlink",
        )
        .with_callback(move || {
            let registry = registry.clone();
            let id = id.clone();
            async move {
                if let Some(registry) = registry.upgrade() {
                    registry.unload(&id, serial);
                }
                Ok(())
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TempEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
