//! Registration of invocable scripts as host actions.

use std::sync::Arc;

use indexmap::IndexMap;
use scripthost_core::{ScriptError, ScriptResult, path};
use scripthost_host::{Action, ActionFuture, ActionRegistry, Callback, ContentStore, HostServices, Reporter, ScriptPicker};
use tokio::sync::Mutex;

use crate::descriptor::DescriptorResolver;
use crate::discovery;
use crate::loader::ModuleLoader;
use crate::module::{INVOKE, ScriptModule};
use crate::settings::Settings;

/// Prefix of action ids synthesized for script files.
pub const SCRIPT_ACTION_PREFIX: &str = "invoke-script-file-";

const SCRIPT_ACTION_ICON: &str = "play";

/// Keeps the host action set in step with the scripts folder.
///
/// Tracks one action per relative script path. The index lock is held for a
/// whole registration pass, so passes never interleave.
pub struct CommandBridge {
    store: Arc<dyn ContentStore>,
    actions: Arc<dyn ActionRegistry>,
    picker: Arc<dyn ScriptPicker>,
    reporter: Reporter,
    resolver: Arc<DescriptorResolver>,
    loader: Arc<ModuleLoader>,
    settings: Arc<Settings>,
    registered: Mutex<IndexMap<String, String>>,
}

impl CommandBridge {
    pub fn new(
        services: &HostServices,
        resolver: Arc<DescriptorResolver>,
        loader: Arc<ModuleLoader>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store: Arc::clone(&services.store),
            actions: Arc::clone(&services.actions),
            picker: Arc::clone(&services.picker),
            reporter: services.reporter(),
            resolver,
            loader,
            settings,
            registered: Mutex::new(IndexMap::new()),
        }
    }

    /// List invocable scripts under a folder, relative to it.
    pub async fn discover(&self, folder: &str) -> ScriptResult<Vec<String>> {
        discovery::discover(self.store.as_ref(), &self.resolver, folder).await
    }

    /// Replace every tracked action with a fresh registration pass.
    ///
    /// Returns the number of scripts registered, or `None` when the folder is
    /// unconfigured or missing. Per-script failures are reported and skipped.
    pub async fn register_all(&self, folder: Option<&str>) -> Option<usize> {
        let mut registered = self.registered.lock().await;
        self.unregister_locked(&mut registered);

        let folder = folder?;
        if !self.store.exists(folder).await {
            self.reporter.warn(
                ScriptError::FolderNotFound {
                    path: folder.to_string(),
                }
                .to_string(),
            );
            return None;
        }

        let scripts = match self.discover(folder).await {
            Ok(scripts) => scripts,
            Err(e) => {
                self.reporter
                    .failure(&format!("Error listing scripts in {folder}"), &e);
                return Some(0);
            }
        };

        let mut count = 0;
        for relative in scripts {
            match self.register_locked(&mut registered, folder, &relative).await {
                Ok(id) => {
                    tracing::debug!(target: "scripthost::bridge", script = %relative, id = %id, "Registered script action");
                    count += 1;
                }
                Err(e) => self
                    .reporter
                    .failure(&format!("Error registering script {relative}"), &e),
            }
        }

        tracing::info!(target: "scripthost::bridge", folder, count, "Registered script actions");
        Some(count)
    }

    /// Register the action for one script. Returns the action id.
    pub async fn register(&self, folder: &str, relative: &str) -> ScriptResult<String> {
        let mut registered = self.registered.lock().await;
        self.register_locked(&mut registered, folder, relative).await
    }

    /// Remove every tracked action.
    pub async fn unregister_all(&self) {
        let mut registered = self.registered.lock().await;
        self.unregister_locked(&mut registered);
    }

    /// Action ids currently tracked, in registration order.
    pub async fn registered_ids(&self) -> Vec<String> {
        self.registered.lock().await.values().cloned().collect()
    }

    /// Action id tracked for a script path.
    pub async fn action_id(&self, relative: &str) -> Option<String> {
        self.registered.lock().await.get(relative).cloned()
    }

    /// Run the action registered for a script path. Failures are reported.
    pub async fn invoke_by_path(&self, relative: &str) {
        let label = format!("Error invoking script {relative}");
        let action = self
            .action_id(relative)
            .await
            .and_then(|id| self.actions.find_action(&id));
        let Some(action) = action else {
            self.reporter.failure(
                &label,
                &ScriptError::NoActionForPath {
                    path: relative.to_string(),
                },
            );
            return;
        };

        if let Some(check) = &action.check_callback {
            match check(true) {
                Ok(true) => {}
                Ok(false) => {
                    self.reporter
                        .warn(format!("Script {relative}: check condition not met"));
                    return;
                }
                Err(e) => {
                    self.reporter.failure(&label, &e);
                    return;
                }
            }
            if let Err(e) = check(false) {
                self.reporter.failure(&label, &e);
            }
            return;
        }

        if let Some(callback) = &action.callback {
            if let Err(e) = callback().await {
                self.reporter.failure(&label, &e);
            }
        }
    }

    /// Evaluate a script and call its `invoke` export directly.
    pub async fn invoke_path(&self, file: &str) {
        if let Err(e) = self.try_invoke_path(file).await {
            self.reporter.failure(&format!("Error invoking {file}"), &e);
        }
    }

    /// Let the user pick a script from the folder and invoke it.
    pub async fn choose_and_invoke(&self, folder: Option<&str>) {
        let items = match folder {
            None => vec!["Error: Invocable scripts folder is not configured".to_string()],
            Some(folder) if !self.store.exists(folder).await => {
                vec![format!("Error: {}", ScriptError::FolderNotFound { path: folder.to_string() })]
            }
            Some(folder) => match self.discover(folder).await {
                Ok(scripts) if scripts.is_empty() => {
                    vec![format!("Error: No invocable scripts found in {folder}")]
                }
                Ok(scripts) => scripts,
                Err(e) => vec![format!("Error: {e}")],
            },
        };

        let Some(choice) = self.picker.pick(&items, "Choose a script to invoke").await else {
            return;
        };
        if choice.starts_with("Error:") {
            return;
        }
        if let Some(folder) = folder {
            self.invoke_path(&path::join([folder, choice.as_str()])).await;
        }
    }

    async fn try_invoke_path(&self, file: &str) -> ScriptResult<()> {
        let descriptor = self.resolver.resolve_invocable(file).await?;
        let module = self.loader.load(&descriptor.load_key()).await?;
        if !module.has_export(INVOKE) {
            return Err(crate::module::missing_export(module.key(), INVOKE));
        }
        module.call_export(INVOKE, &self.settings.app_context()).await?;
        tracing::debug!(target: "scripthost::bridge", script = %file, "Script invoked");
        Ok(())
    }

    async fn register_locked(
        &self,
        registered: &mut IndexMap<String, String>,
        folder: &str,
        relative: &str,
    ) -> ScriptResult<String> {
        let file = path::join([folder, relative]);
        let descriptor = self.resolver.resolve_invocable(&file).await?;
        let module = self.loader.load(&descriptor.load_key()).await?;
        let action = self.build_action(relative, module)?;
        let id = action.id.clone();

        let owned = registered.get(relative).is_some_and(|previous| *previous == id);
        if !owned && self.actions.find_action(&id).is_some() {
            return Err(ScriptError::ActionRejected {
                id,
                message: "action id is already in use".to_string(),
            });
        }

        if let Some(previous) = registered.shift_remove(relative) {
            self.actions.remove_action(&previous);
        }
        self.actions.add_action(action)?;
        registered.insert(relative.to_string(), id.clone());
        Ok(id)
    }

    fn build_action(&self, relative: &str, module: Arc<dyn ScriptModule>) -> ScriptResult<Action> {
        let mut action = Action::new(
            format!("{SCRIPT_ACTION_PREFIX}{relative}"),
            format!("Invoke script: {relative}"),
            SCRIPT_ACTION_ICON,
        );

        if let Some(export) = module.action_export()? {
            if let Some(id) = export.id {
                action.id = id;
            }
            if let Some(name) = export.name {
                action.name = name;
            }
            if let Some(icon) = export.icon {
                action.icon = icon;
            }
            action.callback = export.callback;
            action.check_callback = export.check_callback;
        }

        if !action.is_runnable() {
            if !module.has_export(INVOKE) {
                return Err(crate::module::missing_export(module.key(), INVOKE));
            }
            action.callback = Some(self.invoke_callback(relative, module));
        }
        Ok(action)
    }

    /// Callback running a module's `invoke` export. Never fails: errors are
    /// reported instead.
    fn invoke_callback(&self, relative: &str, module: Arc<dyn ScriptModule>) -> Callback {
        let relative = relative.to_string();
        let reporter = self.reporter.clone();
        let settings = Arc::clone(&self.settings);

        Arc::new(move || -> ActionFuture {
            let module = Arc::clone(&module);
            let relative = relative.clone();
            let reporter = reporter.clone();
            let app = settings.app_context();
            Box::pin(async move {
                match module.call_export(INVOKE, &app).await {
                    Ok(_) => {
                        tracing::debug!(target: "scripthost::bridge", script = %relative, "Script invoked");
                    }
                    Err(e) => reporter.failure(&format!("Error invoking script {relative}"), &e),
                }
                Ok(())
            })
        })
    }

    fn unregister_locked(&self, registered: &mut IndexMap<String, String>) {
        for (_, id) in registered.drain(..) {
            self.actions.remove_action(&id);
        }
    }
}
