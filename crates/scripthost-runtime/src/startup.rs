//! Lifecycle of the singleton startup script.

use std::sync::{Arc, Mutex, MutexGuard};

use scripthost_core::{ScriptError, ScriptResult};
use scripthost_host::{ContentStore, HostServices, Reporter};

use crate::descriptor::DescriptorResolver;
use crate::loader::ModuleLoader;
use crate::module::{CLEANUP, INVOKE, ScriptModule, missing_export};
use crate::settings::Settings;

enum StartupState {
    Unloaded,
    /// A load, reload or cleanup is in progress.
    Invoking,
    Loaded(Arc<dyn ScriptModule>),
}

/// Result of an invoke or reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// No startup script is configured.
    NotConfigured,
    /// The configured file does not exist.
    Missing,
    /// The script's `invoke` ran to completion.
    Invoked,
    /// Loading or invoking failed; the failure has been reported.
    Failed,
}

/// Keeps at most one startup script instance live.
pub struct StartupLifecycle {
    store: Arc<dyn ContentStore>,
    reporter: Reporter,
    resolver: Arc<DescriptorResolver>,
    loader: Arc<ModuleLoader>,
    settings: Arc<Settings>,
    state: Mutex<StartupState>,
}

impl StartupLifecycle {
    pub fn new(
        services: &HostServices,
        resolver: Arc<DescriptorResolver>,
        loader: Arc<ModuleLoader>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store: Arc::clone(&services.store),
            reporter: services.reporter(),
            resolver,
            loader,
            settings,
            state: Mutex::new(StartupState::Unloaded),
        }
    }

    /// Whether a startup script instance is live.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock(), StartupState::Loaded(_))
    }

    /// Invoke the configured startup script.
    ///
    /// Fails with [`ScriptError::AlreadyInvoked`] while an instance is live
    /// or another invoke is in progress. Every other failure is reported and
    /// surfaces only through the outcome.
    pub async fn invoke(&self) -> ScriptResult<StartupOutcome> {
        self.begin(|state| matches!(state, StartupState::Unloaded))?;
        let pass = InvokingPass::new(self);
        Ok(self.load_and_invoke(pass).await)
    }

    /// Tear down the live instance, calling its `cleanup` export if present.
    pub async fn cleanup(&self) {
        let module = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, StartupState::Invoking) {
                StartupState::Loaded(module) => module,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        let pass = InvokingPass::new(self);
        self.run_cleanup(module).await;
        pass.finish(StartupState::Unloaded);
    }

    /// Clean up the live instance, if any, and invoke the script again.
    ///
    /// The state stays in progress throughout, so no invoke can slip in
    /// between the two halves.
    pub async fn reload(&self) -> ScriptResult<StartupOutcome> {
        let previous = self.begin(|state| !matches!(state, StartupState::Invoking))?;
        let pass = InvokingPass::new(self);
        if let StartupState::Loaded(module) = previous {
            self.run_cleanup(module).await;
        }
        Ok(self.load_and_invoke(pass).await)
    }

    /// Move to the in-progress state if `allowed` accepts the current one.
    fn begin(&self, allowed: impl Fn(&StartupState) -> bool) -> ScriptResult<StartupState> {
        let mut state = self.lock();
        if !allowed(&state) {
            return Err(ScriptError::AlreadyInvoked);
        }
        Ok(std::mem::replace(&mut *state, StartupState::Invoking))
    }

    async fn load_and_invoke(&self, pass: InvokingPass<'_>) -> StartupOutcome {
        let (outcome, state) = self.try_load_and_invoke().await;
        pass.finish(state);
        tracing::debug!(target: "scripthost::startup", ?outcome, "Startup script pass finished");
        outcome
    }

    async fn try_load_and_invoke(&self) -> (StartupOutcome, StartupState) {
        let Some(script) = self.settings.startup_script() else {
            return (StartupOutcome::NotConfigured, StartupState::Unloaded);
        };

        if !self.store.exists(&script).await {
            self.reporter.failure(
                &format!("Startup script not found: {script}"),
                &ScriptError::NotFound {
                    path: script.clone(),
                },
            );
            return (StartupOutcome::Missing, StartupState::Unloaded);
        }

        let module = match self.load(&script).await {
            Ok(module) => module,
            Err(e) => {
                self.reporter
                    .failure(&format!("Error loading startup script {script}"), &e);
                return (StartupOutcome::Failed, StartupState::Unloaded);
            }
        };

        if !module.has_export(INVOKE) {
            self.reporter.failure(
                &format!("Startup script {script} cannot be invoked"),
                &missing_export(module.key(), INVOKE),
            );
            return (StartupOutcome::Failed, StartupState::Unloaded);
        }

        let app = self.settings.app_context();
        match module.call_export(INVOKE, &app).await {
            Ok(_) => {
                tracing::info!(target: "scripthost::startup", script = %script, "Startup script invoked");
                (StartupOutcome::Invoked, StartupState::Loaded(module))
            }
            Err(e) => {
                self.reporter
                    .failure(&format!("Error invoking startup script {script}"), &e);
                (StartupOutcome::Failed, StartupState::Loaded(module))
            }
        }
    }

    async fn load(&self, script: &str) -> ScriptResult<Arc<dyn ScriptModule>> {
        let descriptor = self.resolver.resolve(script).await?;
        self.loader.load(&descriptor.load_key()).await
    }

    async fn run_cleanup(&self, module: Arc<dyn ScriptModule>) {
        if !module.has_export(CLEANUP) {
            return;
        }

        let app = self.settings.app_context();
        match module.call_export(CLEANUP, &app).await {
            Ok(_) => {
                tracing::info!(target: "scripthost::startup", module = %module.key(), "Startup script cleaned up");
            }
            Err(e) => self.reporter.failure(
                &format!("Error cleaning up startup script {}", module.key()),
                &e,
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StartupState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the lifecycle in [`StartupState::Invoking`] for one pass.
///
/// A pass dropped before [`finish`](Self::finish), e.g. a cancelled reload,
/// leaves the lifecycle `Unloaded` so later invokes are not locked out.
struct InvokingPass<'a> {
    lifecycle: &'a StartupLifecycle,
    finished: bool,
}

impl<'a> InvokingPass<'a> {
    fn new(lifecycle: &'a StartupLifecycle) -> Self {
        Self {
            lifecycle,
            finished: false,
        }
    }

    fn finish(mut self, state: StartupState) {
        self.finished = true;
        *self.lifecycle.lock() = state;
    }
}

impl Drop for InvokingPass<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(target: "scripthost::startup", "Startup script pass cancelled");
            *self.lifecycle.lock() = StartupState::Unloaded;
        }
    }
}
