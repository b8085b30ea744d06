//! Integration tests for the script runtime.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use scripthost_core::{BoxFuture, RuntimeConfig, ScriptError, ScriptResult};
use scripthost_host::{
    ActionRegistry, ActionTable, FsStore, HostServices, NoticeLevel, NoticeLog, PresetPicker, StyleSheetSet,
};
use scripthost_runtime::commands::STATIC_ACTION_IDS;
use scripthost_runtime::rhai::RhaiEvaluator;
use scripthost_runtime::{
    EvaluatorSet, ModuleEvaluator, ModuleKey, SCRIPT_ACTION_PREFIX, ScriptHost, ScriptModule, ScriptRuntime,
    StartupOutcome,
};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    runtime: Arc<ScriptRuntime>,
    actions: Arc<ActionTable>,
    notices: Arc<NoticeLog>,
    styles: Arc<StyleSheetSet>,
}

impl Fixture {
    fn messages(&self) -> Vec<String> {
        self.notices.notices().into_iter().map(|n| n.message).collect()
    }

    fn script_action_ids(&self) -> Vec<String> {
        self.actions
            .action_ids()
            .into_iter()
            .filter(|id| !STATIC_ACTION_IDS.contains(&id.as_str()))
            .collect()
    }
}

fn write(root: &Path, relative: &str, text: &str) {
    let file = root.join(relative);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(file, text).unwrap();
}

fn config(temp: &TempDir) -> RuntimeConfig {
    RuntimeConfig::builder()
        .root(temp.path())
        .scripts_folder("Scripts")
        .startup_script("startup.rhai")
        .watch_restart_delay_ms(20u64)
        .build()
        .unwrap()
}

fn fixture_with(files: &[(&str, &str)], config: impl FnOnce(&TempDir) -> RuntimeConfig, evaluators: EvaluatorSet) -> Fixture {
    let temp = TempDir::new().unwrap();
    for (relative, text) in files {
        write(temp.path(), relative, text);
    }

    let actions = Arc::new(ActionTable::new());
    let notices = Arc::new(NoticeLog::new());
    let styles = Arc::new(StyleSheetSet::new());
    let services = HostServices::new(
        Arc::new(FsStore::new(temp.path())),
        actions.clone(),
        notices.clone(),
    )
    .with_styles(styles.clone())
    .with_picker(Arc::new(PresetPicker::new("hello.rhai")));

    let runtime = ScriptRuntime::new(services, config(&temp), evaluators);
    Fixture {
        _temp: temp,
        runtime,
        actions,
        notices,
        styles,
    }
}

fn fixture(files: &[(&str, &str)]) -> Fixture {
    fixture_with(files, config, EvaluatorSet::builtin())
}

/// Rhai evaluator that counts evaluations.
struct CountingEvaluator {
    inner: RhaiEvaluator,
    count: Arc<AtomicUsize>,
}

impl ModuleEvaluator for CountingEvaluator {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".rhai"]
    }

    fn languages(&self) -> &'static [&'static str] {
        &["rhai"]
    }

    fn evaluate<'a>(
        &'a self,
        key: &'a ModuleKey,
        source: &'a str,
        host: &'a ScriptHost,
    ) -> BoxFuture<'a, ScriptResult<Arc<dyn ScriptModule>>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.evaluate(key, source, host)
    }
}

const HELLO: &str = r#"fn invoke(app) { notify("hello from " + app.scripts_folder); }"#;

const STARTUP: &str = r#"
fn on_load() { notify("loaded " + this.manifest.name); }
fn on_unload() { notify("unloaded"); }
fn Greeter() { #{ load: Fn("on_load"), unload: Fn("on_unload") } }
fn invoke() { register_temp_extension("Greeter", ".greeter { color: red; }"); }
fn cleanup() { notify("startup cleanup"); }
"#;

const SELECTOR_NOTE: &str = r#"---
codeScriptToolkit:
  isInvocable: true
  invocableCodeScriptName: second
---

```rhai name=first
fn invoke() { notify("first"); }
```

```rhai name=second
fn invoke() { notify("second"); }
```
"#;

#[tokio::test]
async fn test_discovery_order() {
    let f = fixture(&[
        ("Scripts/b.ts", ""),
        ("Scripts/A.ts", ""),
        ("Scripts/readme.txt", ""),
        ("Scripts/note.md", "---\ncodeScriptToolkit:\n  isInvocable: true\n---\n"),
        ("Scripts/plain.md", "# not invocable\n"),
        ("Scripts/Z/c.ts", ""),
        ("Scripts/a/d.rhai", ""),
    ]);

    let scripts = f.runtime.bridge().discover("Scripts").await.unwrap();
    assert_eq!(scripts, vec!["A.ts", "b.ts", "note.md", "a/d.rhai", "Z/c.ts"]);
}

#[tokio::test]
async fn test_loader_evaluates_once_per_key() {
    let count = Arc::new(AtomicUsize::new(0));
    let evaluators = EvaluatorSet::new().with(Arc::new(CountingEvaluator {
        inner: RhaiEvaluator::new(),
        count: count.clone(),
    }));
    let f = fixture_with(
        &[("Scripts/hello.rhai", HELLO), ("Scripts/note.md", SELECTOR_NOTE)],
        config,
        evaluators,
    );
    let loader = f.runtime.loader();
    let key = ModuleKey::new("Scripts/hello.rhai");

    let (a, b) = futures::join!(loader.load(&key), loader.load(&key));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let c = loader.load(&key).await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let first = loader
        .load(&ModuleKey::with_selector("Scripts/note.md", Some("first".into())))
        .await
        .unwrap();
    let second = loader
        .load(&ModuleKey::with_selector("Scripts/note.md", Some("second".into())))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(loader.cached_len(), 3);

    loader.clear_cache();
    assert_eq!(loader.cached_len(), 0);
    let reloaded = loader.load(&key).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &reloaded));
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_loader_missing_file() {
    let f = fixture(&[]);
    let err = f
        .runtime
        .loader()
        .load(&ModuleKey::new("Scripts/nope.rhai"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ScriptError::NotFound { .. }));
}

#[tokio::test]
async fn test_register_all_round_trip() {
    let f = fixture(&[
        ("Scripts/hello.rhai", HELLO),
        ("Scripts/sub/other.lua", "return { invoke = function(app) host.notify('lua') end }"),
    ]);

    let config = f.runtime.settings().config();
    assert_eq!(f.runtime.apply_settings(config.clone()).await, Some(2));
    let first = f.script_action_ids();
    assert_eq!(
        first,
        vec![
            format!("{SCRIPT_ACTION_PREFIX}hello.rhai"),
            format!("{SCRIPT_ACTION_PREFIX}sub/other.lua"),
        ]
    );

    assert_eq!(f.runtime.apply_settings(config).await, Some(2));
    assert_eq!(f.script_action_ids(), first);
    assert_eq!(f.runtime.bridge().registered_ids().await, first);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_script_action_invokes_module() {
    let f = fixture(&[("Scripts/hello.rhai", HELLO)]);
    f.runtime.apply_settings(f.runtime.settings().config()).await;

    let action = f
        .actions
        .find_action(&format!("{SCRIPT_ACTION_PREFIX}hello.rhai"))
        .unwrap();
    assert_eq!(action.name, "Invoke script: hello.rhai");
    assert_eq!(action.icon, "play");
    assert!(action.execute().await.unwrap());
    assert_eq!(f.messages(), vec!["hello from Scripts"]);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_missing_folder_warns_once() {
    let f = fixture(&[]);

    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, None);
    assert!(f.script_action_ids().is_empty());
    assert_eq!(f.notices.count(NoticeLevel::Warning), 1);
    assert!(!f.runtime.watch().is_active());
}

#[tokio::test]
async fn test_unconfigured_folder_is_quiet() {
    let f = fixture_with(&[], |temp| RuntimeConfig::new(temp.path()), EvaluatorSet::builtin());

    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, None);
    assert!(f.notices.notices().is_empty());
}

#[tokio::test]
async fn test_failing_script_does_not_stop_siblings() {
    let f = fixture(&[
        ("Scripts/broken.rhai", "fn invoke( {"),
        ("Scripts/no_invoke.rhai", "fn other() {}"),
        ("Scripts/ok.rhai", HELLO),
    ]);

    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, Some(1));
    assert_eq!(f.script_action_ids(), vec![format!("{SCRIPT_ACTION_PREFIX}ok.rhai")]);
    assert_eq!(f.notices.count(NoticeLevel::Error), 2);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_exported_descriptor_merge() {
    let f = fixture(&[(
        "Scripts/custom.rhai",
        r#"
        fn invoke() { notify("invoked"); }
        fn invoke_command() { #{ id: "custom-id", icon: "" } }
        "#,
    )]);
    f.runtime.apply_settings(f.runtime.settings().config()).await;

    assert_eq!(f.script_action_ids(), vec!["custom-id"]);
    let action = f.actions.find_action("custom-id").unwrap();
    assert_eq!(action.name, "Invoke script: custom.rhai");
    assert_eq!(action.icon, "play");

    assert!(action.execute().await.unwrap());
    assert_eq!(f.messages(), vec!["invoked"]);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_colliding_action_ids_are_rejected() {
    let f = fixture(&[
        ("Scripts/a.rhai", r#"fn invoke() { notify("a"); } fn invoke_command() { #{ id: "shared" } }"#),
        ("Scripts/b.rhai", r#"fn invoke() { notify("b"); } fn invoke_command() { #{ id: "shared" } }"#),
        ("Scripts/c.rhai", r#"fn invoke() { notify("c"); } fn invoke_command() { #{ id: "clear-cache" } }"#),
    ]);
    f.runtime.on_load();

    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, Some(1));
    assert_eq!(f.script_action_ids(), vec!["shared"]);
    assert_eq!(f.notices.count(NoticeLevel::Error), 2);
    assert_eq!(f.actions.find_action("clear-cache").unwrap().name, "Clear cache");

    f.runtime.bridge().invoke_by_path("a.rhai").await;
    assert_eq!(f.messages().last().map(String::as_str), Some("a"));

    // A second pass keeps the static action and re-registers the same script.
    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, Some(1));
    assert_eq!(f.actions.find_action("clear-cache").unwrap().name, "Clear cache");
    assert_eq!(f.runtime.bridge().action_id("a.rhai").await.as_deref(), Some("shared"));

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_invoke_by_path_check_callback() {
    let f = fixture(&[
        (
            "Scripts/gated.rhai",
            r#"
            fn available(checking) {
                if !checking { notify("ran"); }
                true
            }
            fn invoke_command() { #{ name: "Gated", check_callback: Fn("available") } }
            "#,
        ),
        (
            "Scripts/closed.rhai",
            r#"
            fn closed(checking) { false }
            fn invoke_command() { #{ check_callback: Fn("closed") } }
            "#,
        ),
    ]);
    f.runtime.apply_settings(f.runtime.settings().config()).await;
    let bridge = f.runtime.bridge();

    bridge.invoke_by_path("gated.rhai").await;
    assert_eq!(f.messages(), vec!["ran"]);

    bridge.invoke_by_path("closed.rhai").await;
    assert_eq!(f.notices.count(NoticeLevel::Warning), 1);
    assert!(f.messages()[1].contains("check condition not met"));

    bridge.invoke_by_path("unknown.rhai").await;
    assert_eq!(f.notices.count(NoticeLevel::Error), 1);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_markdown_selector_registration() {
    let f = fixture(&[("Scripts/note.md", SELECTOR_NOTE)]);
    f.runtime.apply_settings(f.runtime.settings().config()).await;

    assert_eq!(f.script_action_ids(), vec![format!("{SCRIPT_ACTION_PREFIX}note.md")]);
    f.runtime.bridge().invoke_by_path("note.md").await;
    assert_eq!(f.messages(), vec!["second"]);

    let loader = f.runtime.loader();
    assert!(
        loader
            .cached(&ModuleKey::with_selector("Scripts/note.md", Some("second".into())))
            .is_some()
    );
    assert!(loader.cached(&ModuleKey::new("Scripts/note.md")).is_none());

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_choose_and_invoke() {
    let f = fixture(&[("Scripts/hello.rhai", HELLO)]);

    f.runtime.bridge().choose_and_invoke(Some("Scripts")).await;
    assert_eq!(f.messages(), vec!["hello from Scripts"]);
}

#[tokio::test]
async fn test_startup_invoke_is_exclusive() {
    let f = fixture(&[("startup.rhai", STARTUP)]);
    let startup = f.runtime.startup();

    let (a, b) = futures::join!(startup.invoke(), startup.invoke());
    let outcomes = [a, b];
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ScriptError::AlreadyInvoked)))
        .count();
    assert_eq!(rejected, 1);
    assert!(outcomes.iter().any(|r| matches!(r, Ok(StartupOutcome::Invoked))));
    assert!(startup.is_loaded());

    assert!(matches!(startup.invoke().await, Err(ScriptError::AlreadyInvoked)));

    startup.cleanup().await;
    assert!(!startup.is_loaded());
    startup.cleanup().await;
    assert_eq!(
        f.messages().iter().filter(|m| *m == "startup cleanup").count(),
        1
    );
}

#[tokio::test]
async fn test_startup_missing_and_unconfigured() {
    let f = fixture(&[]);
    assert_eq!(f.runtime.startup().invoke().await.unwrap(), StartupOutcome::Missing);
    assert!(!f.runtime.startup().is_loaded());
    assert_eq!(f.notices.count(NoticeLevel::Error), 1);

    let f = fixture_with(&[], |temp| RuntimeConfig::new(temp.path()), EvaluatorSet::builtin());
    assert_eq!(f.runtime.startup().invoke().await.unwrap(), StartupOutcome::NotConfigured);
    assert!(f.notices.notices().is_empty());
    assert_eq!(f.runtime.startup().reload().await.unwrap(), StartupOutcome::NotConfigured);
    assert!(f.notices.notices().is_empty());
}

/// Rhai evaluator that never finishes while `hold` is set.
struct GatedEvaluator {
    inner: RhaiEvaluator,
    hold: Arc<AtomicBool>,
}

impl ModuleEvaluator for GatedEvaluator {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".rhai"]
    }

    fn languages(&self) -> &'static [&'static str] {
        &["rhai"]
    }

    fn evaluate<'a>(
        &'a self,
        key: &'a ModuleKey,
        source: &'a str,
        host: &'a ScriptHost,
    ) -> BoxFuture<'a, ScriptResult<Arc<dyn ScriptModule>>> {
        if self.hold.load(Ordering::SeqCst) {
            return Box::pin(futures::future::pending());
        }
        self.inner.evaluate(key, source, host)
    }
}

#[tokio::test]
async fn test_cancelled_startup_pass_unlocks_lifecycle() {
    let hold = Arc::new(AtomicBool::new(true));
    let evaluators = EvaluatorSet::new().with(Arc::new(GatedEvaluator {
        inner: RhaiEvaluator::new(),
        hold: Arc::clone(&hold),
    }));
    let f = fixture_with(&[("startup.rhai", STARTUP)], config, evaluators);
    let startup = f.runtime.startup();

    let cancelled = tokio::time::timeout(Duration::from_millis(50), startup.invoke()).await;
    assert!(cancelled.is_err());
    assert!(!startup.is_loaded());

    let cancelled = tokio::time::timeout(Duration::from_millis(50), startup.reload()).await;
    assert!(cancelled.is_err());

    hold.store(false, Ordering::SeqCst);
    assert_eq!(startup.invoke().await.unwrap(), StartupOutcome::Invoked);
    assert!(startup.is_loaded());
}

#[tokio::test]
async fn test_temp_extension_from_startup_script() {
    let f = fixture(&[("startup.rhai", STARTUP)]);

    assert_eq!(f.runtime.on_layout_ready().await.unwrap(), StartupOutcome::Invoked);
    assert_eq!(f.runtime.drain_requests().await, 1);

    let temp = f.runtime.temp_extensions();
    assert_eq!(temp.ids(), vec!["__temp-plugin-Greeter"]);
    assert!(f.actions.find_action("unregister-temp-plugin-Greeter").is_some());
    assert_eq!(f.styles.len(), 1);

    // Reload registers the class again and replaces the live instance.
    assert_eq!(f.runtime.startup().reload().await.unwrap(), StartupOutcome::Invoked);
    assert_eq!(f.runtime.drain_requests().await, 1);
    assert_eq!(temp.ids(), vec!["__temp-plugin-Greeter"]);
    assert_eq!(f.styles.len(), 1);

    let messages = f.messages();
    assert_eq!(
        messages
            .iter()
            .filter(|m| *m == "loaded __Temp Plugin Greeter")
            .count(),
        2
    );
    assert_eq!(messages.iter().filter(|m| *m == "unloaded").count(), 1);

    // The unload action tears the instance down; running it twice is harmless.
    let unload = f.actions.find_action("unregister-temp-plugin-Greeter").unwrap();
    unload.execute().await.unwrap();
    unload.execute().await.unwrap();
    assert!(temp.ids().is_empty());
    assert!(f.styles.is_empty());
    assert!(f.actions.find_action("unregister-temp-plugin-Greeter").is_none());
    assert_eq!(f.messages().iter().filter(|m| *m == "unloaded").count(), 2);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_unregister_unknown_temp_extension() {
    let f = fixture(&[(
        "Scripts/drop.rhai",
        r#"fn invoke() { unregister_temp_extension("Ghost"); }"#,
    )]);
    f.runtime.apply_settings(f.runtime.settings().config()).await;
    f.runtime.bridge().invoke_by_path("drop.rhai").await;

    assert_eq!(f.runtime.drain_requests().await, 1);
    assert_eq!(f.messages(), vec!["Temp plugin Ghost was not registered"]);

    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_request_loop_serves_requests() {
    let f = fixture(&[("startup.rhai", STARTUP)]);
    f.runtime.on_load();
    for id in STATIC_ACTION_IDS {
        assert!(f.actions.find_action(id).is_some());
    }

    f.runtime.on_layout_ready().await.unwrap();
    let temp = f.runtime.temp_extensions();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !temp.contains("__temp-plugin-Greeter") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    // The loop owns the queue.
    assert_eq!(f.runtime.drain_requests().await, 0);

    f.runtime.shutdown().await;
    assert!(temp.ids().is_empty());
    assert!(f.actions.is_empty());
    assert!(f.messages().contains(&"startup cleanup".to_string()));
}

#[tokio::test]
async fn test_static_commands() {
    let f = fixture(&[("Scripts/hello.rhai", HELLO), ("startup.rhai", STARTUP)]);
    f.runtime.on_load();
    f.runtime.apply_settings(f.runtime.settings().config()).await;
    assert!(f.runtime.loader().cached_len() > 0);

    let clear = f.actions.find_action("clear-cache").unwrap();
    assert_eq!(clear.name, "Clear cache");
    assert_eq!(clear.icon, "trash");
    clear.execute().await.unwrap();
    assert_eq!(f.runtime.loader().cached_len(), 0);

    f.actions.find_action("invoke-script").unwrap().execute().await.unwrap();
    assert_eq!(f.messages(), vec!["hello from Scripts"]);

    f.actions
        .find_action("reload-startup-script")
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert!(f.runtime.startup().is_loaded());

    f.runtime.shutdown().await;
    assert!(!f.runtime.startup().is_loaded());
}

#[tokio::test]
async fn test_watch_reregisters_new_scripts() {
    let f = fixture(&[("Scripts/hello.rhai", HELLO)]);
    assert_eq!(f.runtime.apply_settings(f.runtime.settings().config()).await, Some(1));
    assert!(f.runtime.watch().is_active());

    // Let the watch task arm its watcher.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let root = f.runtime.settings().config().root;
    write(&root, "Scripts/added.rhai", HELLO);

    let added = format!("{SCRIPT_ACTION_PREFIX}added.rhai");
    tokio::time::timeout(Duration::from_secs(5), async {
        while f.actions.find_action(&added).is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    f.runtime.shutdown().await;
    assert!(!f.runtime.watch().is_active());
}
