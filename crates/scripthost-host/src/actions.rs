//! Host actions and the registry they are published to.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use scripthost_core::{BoxFuture, ScriptError, ScriptResult};

/// Future returned by an action callback.
pub type ActionFuture = BoxFuture<'static, ScriptResult<()>>;

/// Plain action callback.
pub type Callback = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

/// Conditional action callback. Called with `true` to ask whether the action
/// is available and with `false` to run it.
pub type CheckCallback = Arc<dyn Fn(bool) -> ScriptResult<bool> + Send + Sync>;

/// A user-invocable action published to the host.
#[derive(Clone)]
pub struct Action {
    /// Unique action identifier.
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// Icon identifier.
    pub icon: String,

    /// Callback run when the action executes.
    pub callback: Option<Callback>,

    /// Conditional callback, preferred over `callback` when present.
    pub check_callback: Option<CheckCallback>,
}

impl Action {
    /// Create an action without callbacks.
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            callback: None,
            check_callback: None,
        }
    }

    /// Set the plain callback from an async closure.
    pub fn with_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ScriptResult<()>> + Send + 'static,
    {
        self.callback = Some(Arc::new(move || -> ActionFuture { Box::pin(callback()) }));
        self
    }

    /// Set the conditional callback.
    pub fn with_check_callback<F>(mut self, check: F) -> Self
    where
        F: Fn(bool) -> ScriptResult<bool> + Send + Sync + 'static,
    {
        self.check_callback = Some(Arc::new(check));
        self
    }

    /// Whether the action has anything to run.
    pub fn is_runnable(&self) -> bool {
        self.callback.is_some() || self.check_callback.is_some()
    }

    /// Execute the action.
    ///
    /// Returns `Ok(false)` when a conditional callback reports the action is
    /// unavailable.
    pub async fn execute(&self) -> ScriptResult<bool> {
        if let Some(check) = &self.check_callback {
            if !check(true)? {
                return Ok(false);
            }
            check(false)?;
            return Ok(true);
        }

        match &self.callback {
            Some(callback) => {
                callback().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("icon", &self.icon)
            .field("callback", &self.callback.is_some())
            .field("check_callback", &self.check_callback.is_some())
            .finish()
    }
}

/// Registry of actions exposed to the user.
pub trait ActionRegistry: Send + Sync {
    /// Publish an action, replacing any action with the same id.
    fn add_action(&self, action: Action) -> ScriptResult<()>;

    /// Remove an action. Returns whether it was present.
    fn remove_action(&self, id: &str) -> bool;

    /// Look up an action by id.
    fn find_action(&self, id: &str) -> Option<Action>;

    /// Ids of all published actions in registration order.
    fn action_ids(&self) -> Vec<String>;
}

/// In-memory action registry.
#[derive(Debug, Default)]
pub struct ActionTable {
    actions: Mutex<IndexMap<String, Action>>,
}

impl ActionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published actions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no actions are published.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all published actions.
    pub fn actions(&self) -> Vec<Action> {
        self.lock().values().cloned().collect()
    }

    /// Find and execute an action by id.
    pub async fn execute(&self, id: &str) -> ScriptResult<bool> {
        let action = self
            .find_action(id)
            .ok_or_else(|| ScriptError::ActionRejected {
                id: id.to_string(),
                message: "no such action".to_string(),
            })?;
        action.execute().await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Action>> {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActionRegistry for ActionTable {
    fn add_action(&self, action: Action) -> ScriptResult<()> {
        if action.id.is_empty() {
            return Err(ScriptError::ActionRejected {
                id: action.id,
                message: "action id is empty".to_string(),
            });
        }
        if !action.is_runnable() {
            return Err(ScriptError::ActionRejected {
                id: action.id,
                message: "action has no callback".to_string(),
            });
        }

        tracing::debug!(target: "scripthost::actions", id = %action.id, name = %action.name, "Action added");
        self.lock().insert(action.id.clone(), action);
        Ok(())
    }

    fn remove_action(&self, id: &str) -> bool {
        let removed = self.lock().shift_remove(id).is_some();
        if removed {
            tracing::debug!(target: "scripthost::actions", id, "Action removed");
        }
        removed
    }

    fn find_action(&self, id: &str) -> Option<Action> {
        self.lock().get(id).cloned()
    }

    fn action_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
