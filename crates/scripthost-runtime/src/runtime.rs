//! Runtime orchestrator owning every component.

use std::sync::{Arc, Mutex, Weak};

use scripthost_core::{BoxFuture, RuntimeConfig, ScriptResult};
use scripthost_host::{HostServices, Reporter};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::CommandBridge;
use crate::commands::{self, CommandTargets};
use crate::descriptor::DescriptorResolver;
use crate::loader::{EvaluatorSet, ModuleLoader};
use crate::module::{HostRequest, ScriptHost};
use crate::settings::Settings;
use crate::startup::{StartupLifecycle, StartupOutcome};
use crate::temp::TempExtensionRegistry;
use crate::watch::{ChangeHandler, FolderWatch};

type RequestReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<HostRequest>>>;

/// The script runtime as seen by a host.
///
/// The host calls [`on_load`](Self::on_load) once, then
/// [`on_layout_ready`](Self::on_layout_ready) when its workspace is usable,
/// [`apply_settings`](Self::apply_settings) whenever configuration changes,
/// and [`shutdown`](Self::shutdown) last.
pub struct ScriptRuntime {
    services: HostServices,
    reporter: Reporter,
    settings: Arc<Settings>,
    loader: Arc<ModuleLoader>,
    resolver: Arc<DescriptorResolver>,
    bridge: Arc<CommandBridge>,
    startup: Arc<StartupLifecycle>,
    temp: Arc<TempExtensionRegistry>,
    watch: FolderWatch,
    requests: RequestReceiver,
    cancel: CancellationToken,
    request_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptRuntime {
    pub fn new(services: HostServices, config: RuntimeConfig, evaluators: EvaluatorSet) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = ScriptHost::new(Arc::clone(&services.notifier), tx);
        let settings = Arc::new(Settings::new(config));

        let resolver = Arc::new(DescriptorResolver::new(
            Arc::clone(&services.store),
            Arc::clone(&services.front_matter),
            evaluators.extensions(),
        ));
        let loader = Arc::new(ModuleLoader::new(Arc::clone(&services.store), evaluators, host));
        let bridge = Arc::new(CommandBridge::new(
            &services,
            Arc::clone(&resolver),
            Arc::clone(&loader),
            Arc::clone(&settings),
        ));
        let startup = Arc::new(StartupLifecycle::new(
            &services,
            Arc::clone(&resolver),
            Arc::clone(&loader),
            Arc::clone(&settings),
        ));
        let temp = Arc::new(TempExtensionRegistry::new(&services));
        let watch = FolderWatch::new(&services, Arc::clone(&settings));

        Arc::new(Self {
            reporter: services.reporter(),
            services,
            settings,
            loader,
            resolver,
            bridge,
            startup,
            temp,
            watch,
            requests: Arc::new(AsyncMutex::new(rx)),
            cancel: CancellationToken::new(),
            request_task: Mutex::new(None),
        })
    }

    /// Publish the static actions and start serving script requests.
    pub fn on_load(self: &Arc<Self>) {
        let registered = commands::register(self.services.actions.as_ref(), &self.reporter, self.command_targets());

        let mut task = self.request_task.lock().unwrap_or_else(|p| p.into_inner());
        if task.is_none() {
            *task = Some(tokio::spawn(request_loop(
                Arc::downgrade(self),
                Arc::clone(&self.requests),
                self.cancel.clone(),
            )));
        }
        tracing::info!(target: "scripthost::runtime", registered, "Runtime loaded");
    }

    /// Invoke the startup script, then register scripts and arm the watch.
    ///
    /// Fails only if the startup script is already live.
    pub async fn on_layout_ready(&self) -> ScriptResult<StartupOutcome> {
        let outcome = self.startup.invoke().await;
        self.refresh().await;
        outcome
    }

    /// Replace the configuration, re-register scripts and restart the watch.
    ///
    /// Returns the number of registered scripts, or `None` when the scripts
    /// folder is unconfigured or missing.
    pub async fn apply_settings(&self, config: RuntimeConfig) -> Option<usize> {
        self.settings.replace(config);
        self.refresh().await
    }

    /// Serve queued script requests on the caller's task.
    ///
    /// Returns 0 without doing anything while the request loop owns the
    /// queue.
    pub async fn drain_requests(&self) -> usize {
        let Ok(mut requests) = self.requests.try_lock() else {
            return 0;
        };
        let mut served = 0;
        while let Ok(request) = requests.try_recv() {
            self.handle_request(request).await;
            served += 1;
        }
        served
    }

    /// Tear everything down: watch, startup script, temp extensions, script
    /// actions, static actions, request loop.
    pub async fn shutdown(&self) {
        self.watch.stop();
        self.startup.cleanup().await;
        let unloaded = self.temp.unload_all();
        self.bridge.unregister_all().await;
        commands::unregister(self.services.actions.as_ref());

        self.cancel.cancel();
        let task = self
            .request_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(target: "scripthost::runtime", error = %e, "Request loop ended abnormally");
            }
        }
        tracing::info!(target: "scripthost::runtime", unloaded, "Runtime shut down");
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn resolver(&self) -> &Arc<DescriptorResolver> {
        &self.resolver
    }

    pub fn bridge(&self) -> &Arc<CommandBridge> {
        &self.bridge
    }

    pub fn startup(&self) -> &Arc<StartupLifecycle> {
        &self.startup
    }

    pub fn temp_extensions(&self) -> &Arc<TempExtensionRegistry> {
        &self.temp
    }

    pub fn watch(&self) -> &FolderWatch {
        &self.watch
    }

    async fn refresh(&self) -> Option<usize> {
        self.watch.stop();
        let folder = self.settings.scripts_folder();
        let count = self.bridge.register_all(folder.as_deref()).await;
        if count.is_some() {
            self.watch.start(folder.as_deref(), self.change_handler()).await;
        }
        count
    }

    fn change_handler(&self) -> ChangeHandler {
        let bridge = Arc::downgrade(&self.bridge);
        let settings = Arc::downgrade(&self.settings);
        Arc::new(move || -> BoxFuture<'static, ()> {
            let bridge = bridge.upgrade();
            let folder = settings.upgrade().and_then(|s| s.scripts_folder());
            Box::pin(async move {
                if let Some(bridge) = bridge {
                    bridge.register_all(folder.as_deref()).await;
                }
            })
        })
    }

    fn command_targets(&self) -> CommandTargets {
        CommandTargets {
            bridge: Arc::downgrade(&self.bridge),
            loader: Arc::downgrade(&self.loader),
            temp: Arc::downgrade(&self.temp),
            startup: Arc::downgrade(&self.startup),
            settings: Arc::downgrade(&self.settings),
        }
    }

    async fn handle_request(&self, request: HostRequest) {
        tracing::debug!(target: "scripthost::runtime", ?request, "Serving script request");
        match request {
            HostRequest::RegisterTempExtension {
                module,
                class_name,
                style,
            } => {
                let class = match self
                    .loader
                    .current(&module)
                    .await
                    .and_then(|module| module.extension_class(&class_name))
                {
                    Ok(class) => class,
                    Err(e) => {
                        self.reporter
                            .failure(&format!("Error loading temp plugin {class_name}"), &e);
                        return;
                    }
                };
                // The registry reports its own failures.
                let _ = self.temp.register(class, style).await;
            }
            HostRequest::UnregisterTempExtension { class_name } => {
                self.temp.unregister_by_class_name(&class_name);
            }
        }
    }
}

async fn request_loop(runtime: Weak<ScriptRuntime>, requests: RequestReceiver, cancel: CancellationToken) {
    let mut requests = requests.lock_owned().await;
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        let Some(runtime) = runtime.upgrade() else {
            break;
        };
        runtime.handle_request(request).await;
    }
    tracing::debug!(target: "scripthost::runtime", "Request loop stopped");
}
