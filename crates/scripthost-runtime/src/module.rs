//! Module contract shared by the loader, evaluators and lifecycle components.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use scripthost_core::{BoxFuture, ScriptError, ScriptResult, Value};
use scripthost_host::{Callback, CheckCallback, Notice, Notifier};
use tokio::sync::mpsc;

/// Function called when a script is run as an action.
pub const INVOKE: &str = "invoke";

/// Function called when the startup script is torn down.
pub const CLEANUP: &str = "cleanup";

/// Function returning an action descriptor.
pub const INVOKE_COMMAND: &str = "invoke_command";

/// Marker separating a path from its selector in a [`ModuleKey`].
const SELECTOR_MARKER: &str = "?codeScriptName=";

/// Cache key of an evaluated module: a path plus an optional named code block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub path: String,
    pub selector: Option<String>,
}

impl ModuleKey {
    /// Key for a whole file.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selector: None,
        }
    }

    /// Key for a named code block inside a document.
    pub fn with_selector(path: impl Into<String>, selector: Option<String>) -> Self {
        Self {
            path: path.into(),
            selector: selector.filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Some(selector) => write!(f, "{}{SELECTOR_MARKER}{selector}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

impl FromStr for ModuleKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once(SELECTOR_MARKER) {
            Some((path, selector)) => Self::with_selector(path, Some(selector.to_string())),
            None => Self::new(s),
        })
    }
}

/// Action descriptor exported by a module through `invoke_command`.
///
/// Fields left empty fall back to the synthesized defaults.
#[derive(Default, Clone)]
pub struct ActionExport {
    pub id: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub callback: Option<Callback>,
    pub check_callback: Option<CheckCallback>,
}

impl fmt::Debug for ActionExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExport")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("icon", &self.icon)
            .field("callback", &self.callback.is_some())
            .field("check_callback", &self.check_callback.is_some())
            .finish()
    }
}

/// An evaluated script module.
///
/// Modules are immutable once evaluated; the loader hands out shared
/// references and every caller sees the same instance until the cache is
/// cleared.
pub trait ScriptModule: Send + Sync {
    /// Key the module was evaluated from.
    fn key(&self) -> &ModuleKey;

    /// Whether the module exports a callable with this name.
    fn has_export(&self, export: &str) -> bool;

    /// Call an exported function with the app context.
    ///
    /// Fails with [`ScriptError::MissingExport`] if the export is absent.
    fn call_export<'a>(
        &'a self,
        export: &'static str,
        app: &'a Value,
    ) -> BoxFuture<'a, ScriptResult<Value>>;

    /// The exported action descriptor, if the module provides one.
    fn action_export(&self) -> ScriptResult<Option<ActionExport>>;

    /// Look up an extension class defined by the module.
    fn extension_class(&self, class_name: &str) -> ScriptResult<Arc<dyn ExtensionClass>>;
}

/// Turns script source into a module.
pub trait ModuleEvaluator: Send + Sync {
    /// Evaluator name for logging.
    fn name(&self) -> &'static str;

    /// File extensions handled, lower-case with the leading dot.
    fn file_extensions(&self) -> &'static [&'static str];

    /// Code fence languages handled inside markdown documents.
    fn languages(&self) -> &'static [&'static str];

    /// Evaluate source text. Runs the module's top-level code once.
    fn evaluate<'a>(
        &'a self,
        key: &'a ModuleKey,
        source: &'a str,
        host: &'a ScriptHost,
    ) -> BoxFuture<'a, ScriptResult<Arc<dyn ScriptModule>>>;
}

/// Identity handed to a temporary extension when it is instantiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: String,
    pub min_app_version: String,
}

impl ExtensionManifest {
    pub fn for_class(id: &str, class_name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("__Temp Plugin {class_name}"),
            author: "__Temp Plugin created by scripthost".to_string(),
            description: "__Temp Plugin created by scripthost".to_string(),
            version: "0.0.0".to_string(),
            min_app_version: "0.0.1".to_string(),
        }
    }

    /// Manifest as a script value.
    pub fn to_value(&self) -> Value {
        Value::Object(
            [
                ("id", &self.id),
                ("name", &self.name),
                ("author", &self.author),
                ("description", &self.description),
                ("version", &self.version),
                ("minAppVersion", &self.min_app_version),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v.as_str())))
            .collect(),
        )
    }
}

/// A live extension instance.
pub trait HostExtension: Send + Sync {
    fn load(&self) -> BoxFuture<'_, ScriptResult<()>>;
    fn unload(&self) -> ScriptResult<()>;
}

/// A class that can produce extension instances.
pub trait ExtensionClass: Send + Sync {
    /// Declared class name, if any.
    fn class_name(&self) -> Option<String>;

    fn instantiate(&self, manifest: &ExtensionManifest) -> ScriptResult<Box<dyn HostExtension>>;
}

/// Work a script asks the runtime to perform once the script returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    RegisterTempExtension {
        module: ModuleKey,
        class_name: String,
        style: Option<String>,
    },
    UnregisterTempExtension {
        class_name: String,
    },
}

/// Services available to script code while it runs.
///
/// Requests that would mutate runtime state are queued rather than executed
/// inline, so script code never re-enters a component mid-operation.
#[derive(Clone)]
pub struct ScriptHost {
    notifier: Arc<dyn Notifier>,
    requests: mpsc::UnboundedSender<HostRequest>,
}

impl ScriptHost {
    pub fn new(notifier: Arc<dyn Notifier>, requests: mpsc::UnboundedSender<HostRequest>) -> Self {
        Self { notifier, requests }
    }

    /// Show a notice on behalf of a script.
    pub fn notify(&self, message: &str) {
        self.notifier.notify(Notice::info(message));
    }

    pub fn register_temp_extension(&self, module: &ModuleKey, class_name: &str, style: Option<String>) {
        self.send(HostRequest::RegisterTempExtension {
            module: module.clone(),
            class_name: class_name.to_string(),
            style: style.filter(|css| !css.is_empty()),
        });
    }

    pub fn unregister_temp_extension(&self, class_name: &str) {
        self.send(HostRequest::UnregisterTempExtension {
            class_name: class_name.to_string(),
        });
    }

    fn send(&self, request: HostRequest) {
        if self.requests.send(request).is_err() {
            tracing::warn!(target: "scripthost::runtime", "Host request dropped: runtime is shut down");
        }
    }
}

impl fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHost").finish_non_exhaustive()
    }
}

/// Error for a module that lacks a required export.
pub(crate) fn missing_export(key: &ModuleKey, export: &'static str) -> ScriptError {
    ScriptError::MissingExport {
        path: key.to_string(),
        export,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_key_display_and_parse() {
        let key = ModuleKey::with_selector("Notes/a.md", Some("greet".into()));
        assert_eq!(key.to_string(), "Notes/a.md?codeScriptName=greet");
        assert_eq!("Notes/a.md?codeScriptName=greet".parse::<ModuleKey>().unwrap(), key);
        assert_eq!("Scripts/a.rhai".parse::<ModuleKey>().unwrap(), ModuleKey::new("Scripts/a.rhai"));
    }

    #[test]
    fn test_empty_selector_is_none() {
        let key = ModuleKey::with_selector("a.md", Some(String::new()));
        assert_eq!(key, ModuleKey::new("a.md"));
    }

    #[test]
    fn test_manifest_for_class() {
        let manifest = ExtensionManifest::for_class("__temp-plugin-Foo", "Foo");
        assert_eq!(manifest.name, "__Temp Plugin Foo");
        assert_eq!(manifest.version, "0.0.0");
        assert_eq!(manifest.min_app_version, "0.0.1");
        assert_eq!(manifest.to_value().get("id").and_then(Value::as_str), Some("__temp-plugin-Foo"));
    }

    #[tokio::test]
    async fn test_script_host_queues_requests() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = ScriptHost::new(Arc::new(scripthost_host::NoticeLog::new()), tx);

        host.register_temp_extension(&ModuleKey::new("a.lua"), "Foo", Some(String::new()));
        host.unregister_temp_extension("Foo");

        assert_eq!(
            rx.recv().await,
            Some(HostRequest::RegisterTempExtension {
                module: ModuleKey::new("a.lua"),
                class_name: "Foo".into(),
                style: None,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(HostRequest::UnregisterTempExtension { class_name: "Foo".into() })
        );
    }
}
