//! Lua runtime implementation.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use mlua::{Function, Lua, Table, Value as LuaValue};
use scripthost_core::{BoxFuture, ScriptError, ScriptResult, Value};
use scripthost_host::{ActionFuture, Callback, CheckCallback};

use super::bindings;
use crate::module::{
    ActionExport, ExtensionClass, ExtensionManifest, HostExtension, INVOKE_COMMAND, ModuleEvaluator,
    ModuleKey, ScriptHost, ScriptModule, missing_export,
};

/// Evaluates `.lua` files and `lua` code blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEvaluator;

impl LuaEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleEvaluator for LuaEvaluator {
    fn name(&self) -> &'static str {
        "lua"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &[".lua"]
    }

    fn languages(&self) -> &'static [&'static str] {
        &["lua"]
    }

    fn evaluate<'a>(
        &'a self,
        key: &'a ModuleKey,
        source: &'a str,
        host: &'a ScriptHost,
    ) -> BoxFuture<'a, ScriptResult<Arc<dyn ScriptModule>>> {
        Box::pin(async move {
            let load_error = |e: mlua::Error| ScriptError::load(key.to_string(), e);

            let lua = Lua::new();
            let api = bindings::create_host_api(&lua, key, host).map_err(load_error)?;
            lua.globals().set("host", api).map_err(load_error)?;
            bindings::install_print(&lua, key).map_err(load_error)?;

            let exported: LuaValue = lua
                .load(source)
                .set_name(key.to_string())
                .eval()
                .map_err(load_error)?;

            let module = match exported {
                LuaValue::Table(table) => table,
                LuaValue::Nil => lua.globals(),
                other => {
                    return Err(ScriptError::load(
                        key.to_string(),
                        format!("module chunk must return a table, got {}", other.type_name()),
                    ));
                }
            };

            let module: Arc<dyn ScriptModule> = Arc::new(LuaModule {
                script: Arc::new(LuaScript {
                    key: key.clone(),
                    lua,
                    module,
                }),
            });
            Ok(module)
        })
    }
}

/// Lua state plus the module's export table.
struct LuaScript {
    key: ModuleKey,
    lua: Lua,
    module: Table,
}

impl LuaScript {
    fn function(&self, name: &str) -> Option<Function> {
        match self.module.get::<LuaValue>(name) {
            Ok(LuaValue::Function(f)) => Some(f),
            _ => None,
        }
    }

    fn callback_error(&self, e: mlua::Error) -> ScriptError {
        ScriptError::callback(self.key.to_string(), e)
    }
}

/// A loaded Lua module.
pub struct LuaModule {
    script: Arc<LuaScript>,
}

impl LuaModule {
    fn string_field(table: &Table, field: &str) -> Option<String> {
        table
            .get::<Option<String>>(field)
            .ok()
            .flatten()
            .filter(|s| !s.is_empty())
    }

    fn fn_field(table: &Table, field: &str) -> Option<Function> {
        match table.get::<LuaValue>(field) {
            Ok(LuaValue::Function(f)) => Some(f),
            _ => None,
        }
    }

    fn callback(&self, func: Function) -> Callback {
        let script = Arc::clone(&self.script);
        Arc::new(move || -> ActionFuture {
            let script = Arc::clone(&script);
            let func = func.clone();
            Box::pin(async move {
                func.call::<()>(())
                    .map_err(|e| script.callback_error(e))
            })
        })
    }

    fn check_callback(&self, func: Function) -> CheckCallback {
        let script = Arc::clone(&self.script);
        Arc::new(move |checking: bool| -> ScriptResult<bool> {
            let result = func
                .call::<LuaValue>(checking)
                .map_err(|e| script.callback_error(e))?;
            Ok(is_truthy(&result))
        })
    }

    fn class_table(&self, class_name: &str) -> Option<Table> {
        let lookup = |table: &Table| match table.get::<LuaValue>(class_name) {
            Ok(LuaValue::Table(class)) => Some(class),
            _ => None,
        };
        lookup(&self.script.module).or_else(|| lookup(&self.script.lua.globals()))
    }
}

impl ScriptModule for LuaModule {
    fn key(&self) -> &ModuleKey {
        &self.script.key
    }

    fn has_export(&self, export: &str) -> bool {
        self.script.function(export).is_some()
    }

    fn call_export<'a>(
        &'a self,
        export: &'static str,
        app: &'a Value,
    ) -> BoxFuture<'a, ScriptResult<Value>> {
        Box::pin(async move {
            let func = self
                .script
                .function(export)
                .ok_or_else(|| missing_export(&self.script.key, export))?;

            let arg = value_to_lua(&self.script.lua, app).map_err(|e| self.script.callback_error(e))?;
            let result = func
                .call::<LuaValue>(arg)
                .map_err(|e| self.script.callback_error(e))?;
            Ok(lua_to_value(result))
        })
    }

    fn action_export(&self) -> ScriptResult<Option<ActionExport>> {
        let Some(func) = self.script.function(INVOKE_COMMAND) else {
            return Ok(None);
        };

        let table = match func.call::<LuaValue>(()) {
            Ok(LuaValue::Table(table)) => table,
            Ok(_) => {
                return Err(ScriptError::callback(
                    self.script.key.to_string(),
                    format!("{INVOKE_COMMAND}() must return a table"),
                ));
            }
            Err(e) => return Err(self.script.callback_error(e)),
        };

        Ok(Some(ActionExport {
            id: Self::string_field(&table, "id"),
            name: Self::string_field(&table, "name"),
            icon: Self::string_field(&table, "icon"),
            callback: Self::fn_field(&table, "callback").map(|f| self.callback(f)),
            check_callback: Self::fn_field(&table, "check_callback").map(|f| self.check_callback(f)),
        }))
    }

    fn extension_class(&self, class_name: &str) -> ScriptResult<Arc<dyn ExtensionClass>> {
        let class = self.class_table(class_name).ok_or_else(|| {
            ScriptError::load(
                self.script.key.to_string(),
                format!("no extension class named '{class_name}'"),
            )
        })?;

        Ok(Arc::new(LuaClass {
            script: Arc::clone(&self.script),
            lookup_name: class_name.to_string(),
            class,
        }))
    }
}

/// An extension class table with `load`/`unload` methods and an optional
/// `create` constructor.
struct LuaClass {
    script: Arc<LuaScript>,
    lookup_name: String,
    class: Table,
}

impl LuaClass {
    fn new_instance(&self, manifest: &ExtensionManifest) -> mlua::Result<Table> {
        let lua = &self.script.lua;
        let manifest = value_to_lua(lua, &manifest.to_value())?;

        let instance = match self.class.get::<LuaValue>("create")? {
            LuaValue::Function(create) => match create.call::<LuaValue>((self.class.clone(), manifest.clone()))? {
                LuaValue::Table(instance) => instance,
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "create() must return a table, got {}",
                        other.type_name()
                    )));
                }
            },
            _ => {
                let instance = lua.create_table()?;
                for pair in self.class.pairs::<LuaValue, LuaValue>() {
                    let (k, v) = pair?;
                    instance.set(k, v)?;
                }
                instance
            }
        };

        instance.set("manifest", manifest)?;
        Ok(instance)
    }
}

impl ExtensionClass for LuaClass {
    fn class_name(&self) -> Option<String> {
        LuaModule::string_field(&self.class, "name").or_else(|| Some(self.lookup_name.clone()))
    }

    fn instantiate(&self, manifest: &ExtensionManifest) -> ScriptResult<Box<dyn HostExtension>> {
        let instance = self
            .new_instance(manifest)
            .map_err(|e| ScriptError::load(self.lookup_name.clone(), e))?;

        Ok(Box::new(LuaExtension {
            script: Arc::clone(&self.script),
            instance,
        }))
    }
}

struct LuaExtension {
    script: Arc<LuaScript>,
    instance: Table,
}

impl LuaExtension {
    fn call_hook(&self, hook: &str) -> ScriptResult<()> {
        match LuaModule::fn_field(&self.instance, hook) {
            Some(func) => func
                .call::<()>(self.instance.clone())
                .map_err(|e| self.script.callback_error(e)),
            None => Ok(()),
        }
    }
}

impl HostExtension for LuaExtension {
    fn load(&self) -> BoxFuture<'_, ScriptResult<()>> {
        Box::pin(async move { self.call_hook("load") })
    }

    fn unload(&self) -> ScriptResult<()> {
        self.call_hook("unload")
    }
}

fn is_truthy(value: &LuaValue) -> bool {
    !matches!(value, LuaValue::Nil | LuaValue::Boolean(false))
}

/// Deepest table nesting converted; anything below becomes null.
const MAX_TABLE_DEPTH: usize = 64;

/// Convert a Lua value to our Value type.
///
/// A table that contains itself (directly or through a descendant) converts
/// the repeated reference to null.
pub(crate) fn lua_to_value(lua_val: LuaValue) -> Value {
    let mut ancestors = Vec::new();
    convert_lua(lua_val, &mut ancestors)
}

fn convert_lua(lua_val: LuaValue, ancestors: &mut Vec<*const c_void>) -> Value {
    match lua_val {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(b),
        LuaValue::Integer(i) => Value::Integer(i),
        LuaValue::Number(n) => Value::Float(n),
        LuaValue::String(s) => Value::String(s.to_string_lossy()),
        LuaValue::Table(t) => {
            let ptr = t.to_pointer();
            if ancestors.len() >= MAX_TABLE_DEPTH || ancestors.contains(&ptr) {
                return Value::Null;
            }
            ancestors.push(ptr);

            // Check if it's an array or object
            let mut is_array = true;
            let mut max_index = 0i64;

            for pair in t.clone().pairs::<i64, LuaValue>() {
                match pair {
                    Ok((k, _)) if k > 0 => max_index = max_index.max(k),
                    _ => {
                        is_array = false;
                        break;
                    }
                }
            }

            let value = if is_array && max_index > 0 {
                let arr = (1..=max_index)
                    .filter_map(|i| t.get::<LuaValue>(i).ok())
                    .map(|v| convert_lua(v, ancestors))
                    .collect();
                Value::Array(arr)
            } else {
                let obj: HashMap<String, Value> = t
                    .pairs::<String, LuaValue>()
                    .filter_map(Result::ok)
                    .map(|(k, v)| (k, convert_lua(v, ancestors)))
                    .collect();
                Value::Object(obj)
            };

            ancestors.pop();
            value
        }
        _ => Value::Null,
    }
}

/// Convert our Value type to a Lua value.
pub(crate) fn value_to_lua(lua: &Lua, val: &Value) -> mlua::Result<LuaValue> {
    match val {
        Value::Null => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Integer(i) => Ok(LuaValue::Integer(*i)),
        Value::Float(f) => Ok(LuaValue::Number(*f)),
        Value::String(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        Value::Array(arr) => {
            let table = lua.create_table()?;
            for (i, v) in arr.iter().enumerate() {
                table.set(i + 1, value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Object(obj) => {
            let table = lua.create_table()?;
            for (k, v) in obj {
                table.set(k.as_str(), value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}
