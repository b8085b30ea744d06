//! Folder watch session driving re-registration on change.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use scripthost_core::{BoxFuture, ScriptError};
use scripthost_host::{ContentStore, HostServices, Reporter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::Settings;

/// Pass run after the watched folder changes.
pub type ChangeHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Session {
    folder: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Observes the scripts folder and runs a change pass after each burst of
/// events.
///
/// A single task owns the watcher: it stops observing while the pass runs,
/// waits the restart delay, then observes again, so passes never overlap.
pub struct FolderWatch {
    store: Arc<dyn ContentStore>,
    reporter: Reporter,
    settings: Arc<Settings>,
    session: Mutex<Option<Session>>,
}

impl FolderWatch {
    pub fn new(services: &HostServices, settings: Arc<Settings>) -> Self {
        Self {
            store: Arc::clone(&services.store),
            reporter: services.reporter(),
            settings,
            session: Mutex::new(None),
        }
    }

    /// Start watching `folder`, stopping any previous session first.
    ///
    /// Returns `false` without watching when the folder is unconfigured,
    /// missing, or not backed by the filesystem.
    pub async fn start(&self, folder: Option<&str>, on_change: ChangeHandler) -> bool {
        self.stop();

        let Some(folder) = folder else {
            return false;
        };
        if !self.store.exists(folder).await {
            self.reporter.warn(
                ScriptError::FolderNotFound {
                    path: folder.to_string(),
                }
                .to_string(),
            );
            return false;
        }
        let Some(dir) = self.store.full_path(folder) else {
            self.reporter
                .warn(format!("Cannot watch {folder}: the content store has no filesystem location"));
            return false;
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_loop(WatchLoop {
            store: Arc::clone(&self.store),
            reporter: self.reporter.clone(),
            settings: Arc::clone(&self.settings),
            folder: folder.to_string(),
            dir,
            on_change,
            cancel: cancel.clone(),
        }));

        tracing::info!(target: "scripthost::watch", folder, "Watching scripts folder");
        *self.lock() = Some(Session {
            folder: folder.to_string(),
            cancel,
            task,
        });
        true
    }

    /// Stop the session. A change pass already running completes.
    pub fn stop(&self) {
        if let Some(session) = self.lock().take() {
            session.cancel.cancel();
            tracing::debug!(target: "scripthost::watch", folder = %session.folder, "Stopped watching");
        }
    }

    /// Whether a session is running.
    pub fn is_active(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FolderWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchLoop {
    store: Arc<dyn ContentStore>,
    reporter: Reporter,
    settings: Arc<Settings>,
    folder: String,
    dir: PathBuf,
    on_change: ChangeHandler,
    cancel: CancellationToken,
}

async fn watch_loop(state: WatchLoop) {
    loop {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = match observe(&state.dir, tx) {
            Ok(watcher) => watcher,
            Err(e) => {
                state.reporter.failure(
                    &format!("Error watching {}", state.folder),
                    &ScriptError::Watch {
                        path: state.folder.clone(),
                        message: e.to_string(),
                    },
                );
                return;
            }
        };

        tokio::select! {
            _ = state.cancel.cancelled() => return,
            event = rx.recv() => {
                if event.is_none() {
                    return;
                }
            }
        }

        drop(watcher);
        while rx.try_recv().is_ok() {}

        tracing::debug!(target: "scripthost::watch", folder = %state.folder, "Scripts folder changed");
        (state.on_change)().await;

        tokio::select! {
            _ = state.cancel.cancelled() => return,
            _ = tokio::time::sleep(state.settings.restart_delay()) => {}
        }

        if !state.store.exists(&state.folder).await {
            tracing::warn!(target: "scripthost::watch", folder = %state.folder, "Scripts folder disappeared; watch stopped");
            return;
        }
    }
}

/// Watch `dir` recursively, forwarding relevant events to `tx`.
fn observe(dir: &std::path::Path, tx: mpsc::UnboundedSender<Event>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
        Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
            let _ = tx.send(event);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(target: "scripthost::watch", error = %e, "Watcher error");
        }
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}
