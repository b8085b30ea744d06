//! Dynamic script runtime.
//!
//! Turns the scripts folder of a content store into host actions and keeps
//! them current:
//!
//! - [`ModuleLoader`] evaluates script files and markdown code blocks once
//!   per key and caches the result.
//! - [`DescriptorResolver`] decides which files are invocable.
//! - [`CommandBridge`] discovers scripts and registers one action per script.
//! - [`FolderWatch`] re-registers after the folder changes.
//! - [`StartupLifecycle`] keeps the startup script's single instance.
//! - [`TempExtensionRegistry`] tracks extensions created by scripts.
//!
//! [`ScriptRuntime`] owns one of each and drives them from host lifecycle
//! events.
//!
//! # Example
//!
//! ```ignore
//! use scripthost_runtime::{EvaluatorSet, ScriptRuntime};
//!
//! let runtime = ScriptRuntime::new(services, config, EvaluatorSet::builtin());
//! runtime.on_load();
//! runtime.on_layout_ready().await?;
//! // ...
//! runtime.shutdown().await;
//! ```

mod bridge;
pub mod commands;
mod descriptor;
mod discovery;
mod loader;
pub mod lua;
pub mod markdown;
mod module;
pub mod rhai;
mod runtime;
mod settings;
mod startup;
mod temp;
mod watch;

pub use bridge::{CommandBridge, SCRIPT_ACTION_PREFIX};
pub use descriptor::{DescriptorResolver, RECOGNIZED_EXTENSIONS, ScriptDescriptor};
pub use discovery::discover;
pub use loader::{EvaluatorSet, ModuleLoader};
pub use module::{
    ActionExport, CLEANUP, ExtensionClass, ExtensionManifest, HostExtension, HostRequest, INVOKE,
    INVOKE_COMMAND, ModuleEvaluator, ModuleKey, ScriptHost, ScriptModule,
};
pub use runtime::ScriptRuntime;
pub use settings::Settings;
pub use startup::{StartupLifecycle, StartupOutcome};
pub use temp::{ANONYMOUS_CLASS_NAME, TEMP_EXTENSION_PREFIX, TempExtensionRegistry, UNREGISTER_ACTION_PREFIX};
pub use watch::{ChangeHandler, FolderWatch};
