//! Rust-to-Lua bindings for the host API.

use mlua::{Lua, Table, Value as LuaValue, Variadic};

use crate::module::{ModuleKey, ScriptHost};

/// Create the `host` namespace bound to one module.
pub fn create_host_api(lua: &Lua, key: &ModuleKey, host: &ScriptHost) -> mlua::Result<Table> {
    let api = lua.create_table()?;
    let module = key.to_string();

    api.set("version", env!("CARGO_PKG_VERSION"))?;
    api.set("module", module.as_str())?;

    // host.log_info(msg) / log_warn / log_error
    let name = module.clone();
    api.set(
        "log_info",
        lua.create_function(move |_, msg: String| {
            tracing::info!(target: "script", module = %name, "{}", msg);
            Ok(())
        })?,
    )?;

    let name = module.clone();
    api.set(
        "log_warn",
        lua.create_function(move |_, msg: String| {
            tracing::warn!(target: "script", module = %name, "{}", msg);
            Ok(())
        })?,
    )?;

    let name = module;
    api.set(
        "log_error",
        lua.create_function(move |_, msg: String| {
            tracing::error!(target: "script", module = %name, "{}", msg);
            Ok(())
        })?,
    )?;

    // host.notify(msg)
    let h = host.clone();
    api.set(
        "notify",
        lua.create_function(move |_, msg: String| {
            h.notify(&msg);
            Ok(())
        })?,
    )?;

    // host.register_temp_extension(class_name, css?)
    let (h, k) = (host.clone(), key.clone());
    api.set(
        "register_temp_extension",
        lua.create_function(move |_, (class_name, css): (String, Option<String>)| {
            h.register_temp_extension(&k, &class_name, css);
            Ok(())
        })?,
    )?;

    // host.unregister_temp_extension(class_name)
    let h = host.clone();
    api.set(
        "unregister_temp_extension",
        lua.create_function(move |_, class_name: String| {
            h.unregister_temp_extension(&class_name);
            Ok(())
        })?,
    )?;

    Ok(api)
}

/// Route the global `print` to the log.
pub fn install_print(lua: &Lua, key: &ModuleKey) -> mlua::Result<()> {
    let name = key.to_string();
    let print = lua.create_function(move |_, args: Variadic<LuaValue>| {
        let text: Vec<String> = args.iter().map(display).collect();
        tracing::info!(target: "script", module = %name, "{}", text.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)
}

fn display(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::String(s) => s.to_string_lossy(),
        other => other.type_name().to_string(),
    }
}
