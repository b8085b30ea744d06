//! Rhai runtime implementation.

use std::sync::{Arc, Mutex};

use rhai::{AST, CallFnOptions, Dynamic, Engine, FnPtr, Scope};
use scripthost_core::{BoxFuture, ScriptError, ScriptResult, Value};
use scripthost_host::{ActionFuture, Callback, CheckCallback};

use crate::module::{
    ActionExport, ExtensionClass, ExtensionManifest, HostExtension, INVOKE_COMMAND, ModuleEvaluator,
    ModuleKey, ScriptHost, ScriptModule, missing_export,
};

/// Evaluates `.rhai` files and `rhai` code blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RhaiEvaluator;

impl RhaiEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleEvaluator for RhaiEvaluator {
    fn name(&self) -> &'static str {
        "rhai"
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
        Box::pin(async move {
            let engine = build_engine(key, host);
            let ast = engine
                .compile(source)
                .map_err(|e| ScriptError::load(key.to_string(), e))?;
            engine
                .run_ast(&ast)
                .map_err(|e| ScriptError::load(key.to_string(), e))?;

            let module: Arc<dyn ScriptModule> = Arc::new(RhaiModule {
                script: Arc::new(RhaiScript {
                    key: key.clone(),
                    engine,
                    ast,
                }),
            });
            Ok(module)
        })
    }
}

/// Create an engine with the host API bound to one module.
fn build_engine(key: &ModuleKey, host: &ScriptHost) -> Engine {
    let mut engine = Engine::new();

    // Configure safety limits
    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(64);

    let module = key.to_string();

    let name = module.clone();
    engine.on_print(move |text| {
        tracing::info!(target: "script", module = %name, "{}", text);
    });
    let name = module.clone();
    engine.on_debug(move |text, _source, _pos| {
        tracing::debug!(target: "script", module = %name, "{}", text);
    });

    let name = module.clone();
    engine.register_fn("log_info", move |msg: &str| {
        tracing::info!(target: "script", module = %name, "{}", msg);
    });
    let name = module.clone();
    engine.register_fn("log_warn", move |msg: &str| {
        tracing::warn!(target: "script", module = %name, "{}", msg);
    });
    let name = module;
    engine.register_fn("log_error", move |msg: &str| {
        tracing::error!(target: "script", module = %name, "{}", msg);
    });

    let h = host.clone();
    engine.register_fn("notify", move |msg: &str| h.notify(msg));

    let (h, k) = (host.clone(), key.clone());
    engine.register_fn("register_temp_extension", move |class_name: &str| {
        h.register_temp_extension(&k, class_name, None);
    });
    let (h, k) = (host.clone(), key.clone());
    engine.register_fn(
        "register_temp_extension",
        move |class_name: &str, css: &str| {
            h.register_temp_extension(&k, class_name, Some(css.to_string()));
        },
    );
    let h = host.clone();
    engine.register_fn("unregister_temp_extension", move |class_name: &str| {
        h.unregister_temp_extension(class_name);
    });

    engine
}

/// Compiled script plus the engine it runs in.
struct RhaiScript {
    key: ModuleKey,
    engine: Engine,
    ast: AST,
}

impl RhaiScript {
    fn has_fn(&self, name: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    fn call_fn(&self, name: &str, args: Vec<Dynamic>) -> ScriptResult<Dynamic> {
        let mut scope = Scope::new();
        self.engine
            .call_fn_with_options::<Dynamic>(
                CallFnOptions::new().eval_ast(false),
                &mut scope,
                &self.ast,
                name,
                args,
            )
            .map_err(|e| ScriptError::callback(self.key.to_string(), e))
    }

    fn call_ptr(&self, ptr: &FnPtr, args: Vec<Dynamic>) -> ScriptResult<Dynamic> {
        ptr.call::<Dynamic>(&self.engine, &self.ast, args)
            .map_err(|e| ScriptError::callback(self.key.to_string(), e))
    }

    /// Call a function pointer with `this` bound to an instance.
    fn call_method(&self, this: &mut Dynamic, ptr: &FnPtr) -> ScriptResult<Dynamic> {
        let mut scope = Scope::new();
        self.engine
            .call_fn_with_options::<Dynamic>(
                CallFnOptions::new().eval_ast(false).bind_this_ptr(this),
                &mut scope,
                &self.ast,
                ptr.fn_name(),
                ptr.curry().to_vec(),
            )
            .map_err(|e| ScriptError::callback(self.key.to_string(), e))
    }
}

/// A loaded Rhai module.
pub struct RhaiModule {
    script: Arc<RhaiScript>,
}

impl RhaiModule {
    fn string_field(map: &rhai::Map, field: &str) -> Option<String> {
        map.get(field)
            .and_then(|v| v.clone().into_string().ok())
            .filter(|s| !s.is_empty())
    }

    fn fn_field(map: &rhai::Map, field: &str) -> Option<FnPtr> {
        map.get(field).and_then(|v| v.clone().try_cast::<FnPtr>())
    }

    fn callback(&self, ptr: FnPtr) -> Callback {
        let script = Arc::clone(&self.script);
        Arc::new(move || -> ActionFuture {
            let script = Arc::clone(&script);
            let ptr = ptr.clone();
            Box::pin(async move { script.call_ptr(&ptr, Vec::new()).map(|_| ()) })
        })
    }

    fn check_callback(&self, ptr: FnPtr) -> CheckCallback {
        let script = Arc::clone(&self.script);
        Arc::new(move |checking: bool| -> ScriptResult<bool> {
            let result = script.call_ptr(&ptr, vec![Dynamic::from(checking)])?;
            Ok(result.as_bool().unwrap_or(!result.is_unit()))
        })
    }
}

impl ScriptModule for RhaiModule {
    fn key(&self) -> &ModuleKey {
        &self.script.key
    }

    fn has_export(&self, export: &str) -> bool {
        self.script
            .ast
            .iter_functions()
            .any(|f| f.name == export)
    }

    fn call_export<'a>(
        &'a self,
        export: &'static str,
        app: &'a Value,
    ) -> BoxFuture<'a, ScriptResult<Value>> {
        Box::pin(async move {
            let args = if self.script.has_fn(export, 1) {
                vec![value_to_dynamic(app)]
            } else if self.script.has_fn(export, 0) {
                Vec::new()
            } else {
                return Err(missing_export(&self.script.key, export));
            };

            let result = self.script.call_fn(export, args)?;
            Ok(dynamic_to_value(&result))
        })
    }

    fn action_export(&self) -> ScriptResult<Option<ActionExport>> {
        if !self.script.has_fn(INVOKE_COMMAND, 0) {
            return Ok(None);
        }

        let result = self.script.call_fn(INVOKE_COMMAND, Vec::new())?;
        let map = result.try_cast::<rhai::Map>().ok_or_else(|| {
            ScriptError::callback(
                self.script.key.to_string(),
                format!("{INVOKE_COMMAND}() must return a map"),
            )
        })?;

        Ok(Some(ActionExport {
            id: Self::string_field(&map, "id"),
            name: Self::string_field(&map, "name"),
            icon: Self::string_field(&map, "icon"),
            callback: Self::fn_field(&map, "callback").map(|ptr| self.callback(ptr)),
            check_callback: Self::fn_field(&map, "check_callback").map(|ptr| self.check_callback(ptr)),
        }))
    }

    fn extension_class(&self, class_name: &str) -> ScriptResult<Arc<dyn ExtensionClass>> {
        if !self.script.has_fn(class_name, 0) {
            return Err(ScriptError::load(
                self.script.key.to_string(),
                format!("no extension class named '{class_name}'"),
            ));
        }

        Ok(Arc::new(RhaiClass {
            script: Arc::clone(&self.script),
            constructor: class_name.to_string(),
        }))
    }
}

/// An extension class: a zero-argument function returning the instance map.
struct RhaiClass {
    script: Arc<RhaiScript>,
    constructor: String,
}

impl ExtensionClass for RhaiClass {
    fn class_name(&self) -> Option<String> {
        Some(self.constructor.clone())
    }

    fn instantiate(&self, manifest: &ExtensionManifest) -> ScriptResult<Box<dyn HostExtension>> {
        let instance = self.script.call_fn(&self.constructor, Vec::new())?;
        let mut map = instance.try_cast::<rhai::Map>().ok_or_else(|| {
            ScriptError::load(
                self.constructor.clone(),
                "extension class must return a map",
            )
        })?;
        map.insert("manifest".into(), value_to_dynamic(&manifest.to_value()));

        Ok(Box::new(RhaiExtension {
            script: Arc::clone(&self.script),
            instance: Mutex::new(Dynamic::from_map(map)),
        }))
    }
}

struct RhaiExtension {
    script: Arc<RhaiScript>,
    instance: Mutex<Dynamic>,
}

impl RhaiExtension {
    fn call_hook(&self, hook: &str) -> ScriptResult<()> {
        let mut instance = self
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let ptr = instance
            .clone()
            .try_cast::<rhai::Map>()
            .and_then(|map| RhaiModule::fn_field(&map, hook));
        match ptr {
            Some(ptr) => self.script.call_method(&mut instance, &ptr).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl HostExtension for RhaiExtension {
    fn load(&self) -> BoxFuture<'_, ScriptResult<()>> {
        Box::pin(async move { self.call_hook("load") })
    }

    fn unload(&self) -> ScriptResult<()> {
        self.call_hook("unload")
    }
}

/// Convert a Rhai Dynamic to our Value type.
pub(crate) fn dynamic_to_value(val: &Dynamic) -> Value {
    if val.is_unit() {
        Value::Null
    } else if val.is_bool() {
        Value::Bool(val.as_bool().unwrap_or(false))
    } else if val.is_int() {
        Value::Integer(val.as_int().unwrap_or(0))
    } else if val.is_float() {
        Value::Float(val.as_float().unwrap_or(0.0))
    } else if val.is_string() {
        Value::String(val.clone().into_string().unwrap_or_default())
    } else if val.is_array() {
        let arr = val.clone().into_array().unwrap_or_default();
        Value::Array(arr.iter().map(dynamic_to_value).collect())
    } else if val.is_map() {
        let map = val.clone().cast::<rhai::Map>();
        Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_value(&v)))
                .collect(),
        )
    } else {
        Value::Null
    }
}

/// Convert our Value type to a Rhai Dynamic.
pub(crate) fn value_to_dynamic(val: &Value) -> Dynamic {
    match val {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Integer(i) => Dynamic::from(*i),
        Value::Float(f) => Dynamic::from(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let rhai_arr: rhai::Array = arr.iter().map(value_to_dynamic).collect();
            Dynamic::from(rhai_arr)
        }
        Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), value_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}
