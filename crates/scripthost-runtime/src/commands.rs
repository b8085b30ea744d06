//! Static actions the runtime publishes regardless of the scripts folder.

use std::sync::Weak;

use scripthost_host::{Action, ActionRegistry, Reporter};

use crate::bridge::CommandBridge;
use crate::loader::ModuleLoader;
use crate::settings::Settings;
use crate::startup::StartupLifecycle;
use crate::temp::TempExtensionRegistry;

pub const INVOKE_SCRIPT: &str = "invoke-script";
pub const CLEAR_CACHE: &str = "clear-cache";
pub const UNLOAD_TEMP_PLUGINS: &str = "unload-temp-plugins";
pub const RELOAD_STARTUP_SCRIPT: &str = "reload-startup-script";

/// Ids of the static actions, in registration order.
pub const STATIC_ACTION_IDS: [&str; 4] = [INVOKE_SCRIPT, CLEAR_CACHE, UNLOAD_TEMP_PLUGINS, RELOAD_STARTUP_SCRIPT];

/// Components the static actions drive.
///
/// Actions hold weak references: the action registry must not keep the
/// runtime alive.
pub(crate) struct CommandTargets {
    pub bridge: Weak<CommandBridge>,
    pub loader: Weak<ModuleLoader>,
    pub temp: Weak<TempExtensionRegistry>,
    pub startup: Weak<StartupLifecycle>,
    pub settings: Weak<Settings>,
}

pub(crate) fn static_actions(targets: CommandTargets) -> Vec<Action> {
    let CommandTargets {
        bridge,
        loader,
        temp,
        startup,
        settings,
    } = targets;

    vec![
        Action::new(INVOKE_SCRIPT, "Invoke script: <<Choose>>", "circle-play").with_callback(move || {
            let bridge = bridge.upgrade();
            let folder = settings.upgrade().and_then(|s| s.scripts_folder());
            async move {
                if let Some(bridge) = bridge {
                    bridge.choose_and_invoke(folder.as_deref()).await;
                }
                Ok(())
            }
        }),
        Action::new(CLEAR_CACHE, "Clear cache", "trash").with_callback(move || {
            if let Some(loader) = loader.upgrade() {
                loader.clear_cache();
            }
            async { Ok(()) }
        }),
        Action::new(UNLOAD_TEMP_PLUGINS, "Unload temp plugins", "upload").with_callback(move || {
            if let Some(temp) = temp.upgrade() {
                temp.unload_all();
            }
            async { Ok(()) }
        }),
        Action::new(RELOAD_STARTUP_SCRIPT, "Reload startup script", "upload").with_callback(move || {
            let startup = startup.upgrade();
            async move {
                if let Some(startup) = startup {
                    startup.reload().await?;
                }
                Ok(())
            }
        }),
    ]
}

/// Publish the static actions. Failures are reported and skipped.
pub(crate) fn register(actions: &dyn ActionRegistry, reporter: &Reporter, targets: CommandTargets) -> usize {
    let mut count = 0;
    for action in static_actions(targets) {
        let id = action.id.clone();
        match actions.add_action(action) {
            Ok(()) => count += 1,
            Err(e) => reporter.failure(&format!("Error registering command {id}"), &e),
        }
    }
    count
}

/// Remove the static actions.
pub(crate) fn unregister(actions: &dyn ActionRegistry) {
    for id in STATIC_ACTION_IDS {
        actions.remove_action(id);
    }
}
