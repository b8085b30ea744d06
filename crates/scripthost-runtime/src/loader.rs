//! Module loading and caching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use scripthost_core::{ScriptError, ScriptResult, path};
use scripthost_host::ContentStore;
use tokio::sync::OnceCell;

use crate::markdown;
use crate::module::{ModuleEvaluator, ModuleKey, ScriptHost, ScriptModule};

type ModuleCell = Arc<OnceCell<Arc<dyn ScriptModule>>>;

/// Evaluators available to the loader, looked up by extension or fence
/// language.
#[derive(Clone, Default)]
pub struct EvaluatorSet {
    evaluators: Vec<Arc<dyn ModuleEvaluator>>,
}

impl EvaluatorSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The Rhai and Lua evaluators.
    pub fn builtin() -> Self {
        Self::new()
            .with(Arc::new(crate::rhai::RhaiEvaluator::new()))
            .with(Arc::new(crate::lua::LuaEvaluator::new()))
    }

    /// Add an evaluator. Earlier evaluators win on overlapping extensions.
    pub fn with(mut self, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        tracing::debug!(target: "scripthost::loader", evaluator = evaluator.name(), "Registered evaluator");
        self.evaluators.push(evaluator);
        self
    }

    pub fn for_extension(&self, ext: &str) -> Option<&Arc<dyn ModuleEvaluator>> {
        self.evaluators
            .iter()
            .find(|e| e.file_extensions().contains(&ext))
    }

    pub fn for_language(&self, language: &str) -> Option<&Arc<dyn ModuleEvaluator>> {
        self.evaluators.iter().find(|e| e.languages().contains(&language))
    }

    /// Every file extension some evaluator handles.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.evaluators
            .iter()
            .flat_map(|e| e.file_extensions().iter().copied())
            .collect()
    }
}

/// Resolves module keys to evaluated modules and caches them.
///
/// Each key is evaluated at most once while cached; concurrent loads of the
/// same key share one in-flight evaluation. Failed evaluations are not
/// cached.
pub struct ModuleLoader {
    store: Arc<dyn ContentStore>,
    evaluators: EvaluatorSet,
    host: ScriptHost,
    cache: Mutex<HashMap<ModuleKey, ModuleCell>>,
}

impl ModuleLoader {
    pub fn new(store: Arc<dyn ContentStore>, evaluators: EvaluatorSet, host: ScriptHost) -> Self {
        Self {
            store,
            evaluators,
            host,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn evaluators(&self) -> &EvaluatorSet {
        &self.evaluators
    }

    /// Load a module, evaluating it on first use.
    pub async fn load(&self, key: &ModuleKey) -> ScriptResult<Arc<dyn ScriptModule>> {
        if !self.store.exists(&key.path).await {
            return Err(ScriptError::NotFound {
                path: key.path.clone(),
            });
        }

        let cell = Arc::clone(self.lock().entry(key.clone()).or_default());
        let module = cell.get_or_try_init(|| self.evaluate(key)).await?;
        Ok(Arc::clone(module))
    }

    /// The live module for a key without re-evaluating a failed one.
    ///
    /// Waits for an in-flight evaluation. If the key was never loaded or the
    /// cache has been cleared since, the module is loaded afresh.
    pub async fn current(&self, key: &ModuleKey) -> ScriptResult<Arc<dyn ScriptModule>> {
        let cell = self.lock().get(key).cloned();
        match cell {
            Some(cell) => cell
                .get_or_try_init(|| async {
                    Err(ScriptError::load(key.to_string(), "module failed to evaluate"))
                })
                .await
                .cloned(),
            None => self.load(key).await,
        }
    }

    /// The cached module for a key, if evaluated.
    pub fn cached(&self, key: &ModuleKey) -> Option<Arc<dyn ScriptModule>> {
        self.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of evaluated modules in the cache.
    pub fn cached_len(&self) -> usize {
        self.lock().values().filter(|cell| cell.initialized()).count()
    }

    /// Drop every cached module. Loads in flight complete but are not cached.
    pub fn clear_cache(&self) {
        let cleared = {
            let mut cache = self.lock();
            let count = cache.len();
            cache.clear();
            count
        };
        tracing::info!(target: "scripthost::loader", cleared, "Module cache cleared");
    }

    async fn evaluate(&self, key: &ModuleKey) -> ScriptResult<Arc<dyn ScriptModule>> {
        let text = self.store.read(&key.path).await?;

        let module = if path::is_markdown(&key.path) {
            let blocks = markdown::code_blocks(&text);
            let block = markdown::select_block(&blocks, key.selector.as_deref(), |lang| {
                self.evaluators.for_language(lang).is_some()
            })
            .ok_or_else(|| match &key.selector {
                Some(selector) => {
                    ScriptError::load(key.to_string(), format!("no code block named '{selector}'"))
                }
                None => ScriptError::load(key.to_string(), "no code block in a supported language"),
            })?;
            let evaluator = self.evaluators.for_language(&block.language).ok_or_else(|| {
                ScriptError::load(
                    key.to_string(),
                    format!("no evaluator for code block language '{}'", block.language),
                )
            })?;

            tracing::debug!(target: "scripthost::loader", module = %key, evaluator = evaluator.name(), "Evaluating code block");
            evaluator.evaluate(key, &block.code, &self.host).await?
        } else {
            let evaluator = path::extension(&key.path)
                .and_then(|ext| self.evaluators.for_extension(&ext))
                .ok_or_else(|| ScriptError::NoEvaluator {
                    path: key.path.clone(),
                })?;

            tracing::debug!(target: "scripthost::loader", module = %key, evaluator = evaluator.name(), "Evaluating module");
            evaluator.evaluate(key, &text, &self.host).await?
        };

        tracing::info!(target: "scripthost::loader", module = %key, "Module loaded");
        Ok(module)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ModuleKey, ModuleCell>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
