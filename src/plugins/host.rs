//! Embedded Lua host for plugin scripts
//!
//! One interpreter holds every loaded plugin. Each plugin's entry script
//! publishes a global table named after the plugin; its functions are what
//! macro tokens call.

use std::collections::HashMap;
use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, RegistryKey, Table, Value};
use tracing::{debug, warn};

use crate::error::{MacroError, Result};
use crate::expand::{ReturnValue, TypedValue};

use super::source::{PluginSource, ENTRY_SCRIPT};

/// Lua state shared by all loaded plugins.
pub struct ScriptHost {
    /// Per-plugin environment tables holding the plugin-scoped `require`
    environments: HashMap<String, RegistryKey>,
    lua: Option<Lua>,
}

impl ScriptHost {
    /// Start a fresh, sandboxed interpreter.
    ///
    /// # Errors
    /// Returns [`MacroError::Load`] if the sandbox prelude fails to run.
    pub fn new() -> Result<Self> {
        let lua = Lua::new();

        // Plugins format text; they have no business touching processes or files
        lua.load(
            r#"
            os.execute = nil
            os.exit = nil
            os.remove = nil
            os.rename = nil
            io.popen = nil
            loadfile = nil
            dofile = nil
        "#,
        )
        .set_name("sandbox")
        .exec()
        .map_err(|e| MacroError::load("<host>", e))?;

        debug!("Lua script host started");
        Ok(Self {
            environments: HashMap::new(),
            lua: Some(lua),
        })
    }

    /// Whether the interpreter is alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lua.is_some()
    }

    fn lua(&self) -> Result<&Lua> {
        self.lua.as_ref().ok_or(MacroError::HostClosed)
    }

    /// Give a plugin its own module resolver.
    ///
    /// The plugin's scripts run in a private environment whose `require`
    /// looks in the plugin's own source first, so two plugins can both ship a
    /// `util.lua` without one shadowing the other. Modules the plugin does
    /// not have fall through to the interpreter's global `require`, as do
    /// names that would reach outside the plugin's files. Global assignments
    /// land in `_G` once the entry script succeeds.
    ///
    /// # Errors
    /// Returns [`MacroError::HostClosed`] on a stopped host, or
    /// [`MacroError::Load`] if the environment cannot be built.
    pub fn register_module_resolver(
        &mut self,
        plugin_id: &str,
        source: Arc<dyn PluginSource>,
    ) -> Result<()> {
        let lua = self.lua()?;
        let env = build_environment(lua, plugin_id, source)
            .map_err(|e| MacroError::load(plugin_id, e))?;
        let key = lua
            .create_registry_value(env)
            .map_err(|e| MacroError::load(plugin_id, e))?;

        if let Some(old) = self.environments.insert(plugin_id.to_string(), key) {
            if let Some(lua) = &self.lua {
                lua.remove_registry_value(old).ok();
            }
        }
        Ok(())
    }

    /// Run a plugin's entry script.
    ///
    /// The script runs in the plugin's environment when a resolver was
    /// registered for it, otherwise in a fresh one. Globals it assigns are
    /// staged and only published to `_G` once the script has run to
    /// completion, so a failing script leaves other plugins untouched.
    ///
    /// # Errors
    /// Returns [`MacroError::Load`] if the script fails to compile or raises.
    pub fn load_plugin_source(&self, plugin_id: &str, code: &str) -> Result<()> {
        let lua = self.lua()?;
        let load_error = |e: mlua::Error| MacroError::load(plugin_id, e);

        let env: Table = match self.environments.get(plugin_id) {
            Some(key) => lua.registry_value(key).map_err(load_error)?,
            None => lua.create_table().map_err(load_error)?,
        };

        let globals = lua.globals();
        let staging = lua.create_table().map_err(load_error)?;
        staging.set_metatable(Some(
            scope_metatable(lua, globals.clone(), None).map_err(load_error)?,
        ));
        env.set_metatable(Some(
            scope_metatable(lua, staging.clone(), Some(staging.clone())).map_err(load_error)?,
        ));

        let result = lua
            .load(code)
            .set_name(format!("@{plugin_id}/{ENTRY_SCRIPT}"))
            .set_environment(env.clone())
            .exec();

        env.set_metatable(Some(
            scope_metatable(lua, globals.clone(), Some(globals.clone())).map_err(load_error)?,
        ));

        if let Err(e) = result {
            warn!(plugin = plugin_id, error = %e, "Entry script failed");
            return Err(load_error(e));
        }

        for pair in staging.pairs::<Value, Value>() {
            let (key, value) = pair.map_err(load_error)?;
            globals.set(key, value).map_err(load_error)?;
        }
        Ok(())
    }

    /// Whether a global table with this name exists
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.lua
            .as_ref()
            .and_then(|lua| lua.globals().get::<_, Value>(name).ok())
            .is_some_and(|value| matches!(value, Value::Table(_)))
    }

    /// Call `plugin.function(args...)` and read exactly `expected_returns`
    /// results. Missing results read as nil, extra ones are dropped.
    ///
    /// Lua errors raised by the function are trapped and reported as
    /// [`MacroError::Invocation`].
    ///
    /// # Errors
    /// - [`MacroError::NotFound`] if the plugin table or function does not exist
    /// - [`MacroError::Invocation`] if the call raises
    /// - [`MacroError::HostClosed`] on a stopped host
    pub fn invoke(
        &self,
        plugin: &str,
        function: &str,
        args: &[TypedValue],
        expected_returns: usize,
    ) -> Result<Vec<ReturnValue>> {
        let lua = self.lua()?;
        let call = format!("{plugin}.{function}");
        let invocation = |e: mlua::Error| MacroError::Invocation {
            call: call.clone(),
            reason: e.to_string(),
        };

        let table = match lua.globals().get::<_, Value>(plugin).map_err(invocation)? {
            Value::Table(table) => table,
            Value::Nil => return Err(MacroError::NotFound(format!("plugin {plugin}"))),
            _ => {
                return Err(MacroError::NotFound(format!(
                    "plugin {plugin} (global is not a Lua table)"
                )))
            }
        };

        let func = match table.get::<_, Value>(function).map_err(invocation)? {
            Value::Function(func) => func,
            _ => {
                return Err(MacroError::NotFound(format!(
                    "function {function} in plugin {plugin}"
                )))
            }
        };

        let lua_args = args
            .iter()
            .map(|arg| to_lua(lua, arg))
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(invocation)?;

        debug!(call = %call, args = args.len(), "Invoking plugin function");
        let results = func
            .call::<_, MultiValue>(MultiValue::from_vec(lua_args))
            .map_err(|e| {
                warn!(call = %call, error = %e, "Plugin function raised");
                invocation(e)
            })?;

        let mut results = results.into_vec();
        results.resize(expected_returns, Value::Nil);
        results
            .into_iter()
            .map(|value| from_lua(lua, value))
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(invocation)
    }

    /// Release the interpreter. Safe to call more than once, and on a host
    /// that never started.
    pub fn shutdown(&mut self) {
        self.environments.clear();
        if self.lua.take().is_some() {
            debug!("Lua script host shut down");
        }
    }
}

impl Default for ScriptHost {
    /// A host that has not been started
    fn default() -> Self {
        Self {
            environments: HashMap::new(),
            lua: None,
        }
    }
}

fn build_environment<'lua>(
    lua: &'lua Lua,
    plugin_id: &str,
    source: Arc<dyn PluginSource>,
) -> mlua::Result<Table<'lua>> {
    let env = lua.create_table()?;
    env.set_metatable(Some(scope_metatable(lua, lua.globals(), Some(lua.globals()))?));

    let env_key = lua.create_registry_value(env.clone())?;
    let cache_key = lua.create_registry_value(lua.create_table()?)?;
    let plugin_id = plugin_id.to_string();

    let require = lua.create_function(move |lua, name: String| {
        let cache: Table = lua.registry_value(&cache_key)?;
        let cached: Value = cache.get(name.as_str())?;
        if !matches!(cached, Value::Nil) {
            return Ok(cached);
        }

        let path = module_path(&name);
        let code = if is_local_module_name(&name) {
            source.read(&path).map_err(mlua::Error::external)?
        } else {
            None
        };
        let Some(code) = code else {
            let require: Function = lua.globals().get("require")?;
            return require.call::<_, Value>(name);
        };

        debug!(plugin = %plugin_id, module = %name, "Loading plugin module");
        let env: Table = lua.registry_value(&env_key)?;
        let value: Value = lua
            .load(code)
            .set_name(format!("@{plugin_id}/{path}"))
            .set_environment(env)
            .call(name.as_str())?;
        let value = if matches!(value, Value::Nil) {
            Value::Boolean(true)
        } else {
            value
        };
        cache.set(name, value.clone())?;
        Ok(value)
    })?;
    env.raw_set("require", require)?;

    Ok(env)
}

/// Metatable sending reads to `reads` and, if given, writes to `writes`
fn scope_metatable<'lua>(
    lua: &'lua Lua,
    reads: Table<'lua>,
    writes: Option<Table<'lua>>,
) -> mlua::Result<Table<'lua>> {
    let meta = lua.create_table()?;
    meta.set("__index", reads)?;
    if let Some(writes) = writes {
        meta.set("__newindex", writes)?;
    }
    Ok(meta)
}

/// Absolute or parent-relative names never resolve against plugin files
fn is_local_module_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.contains("..")
        && !name.contains(['\\', ':'])
}

/// `a.b` → `a/b.lua`
fn module_path(name: &str) -> String {
    format!("{}.lua", name.replace('.', "/"))
}

fn to_lua<'lua>(lua: &'lua Lua, value: &TypedValue) -> mlua::Result<Value<'lua>> {
    Ok(match value {
        TypedValue::String(s) => Value::String(lua.create_string(s)?),
        TypedValue::Number(n) => Value::Number(*n),
        TypedValue::Boolean(b) => Value::Boolean(*b),
    })
}

fn from_lua<'lua>(lua: &'lua Lua, value: Value<'lua>) -> mlua::Result<ReturnValue> {
    Ok(match value {
        Value::Nil => ReturnValue::Nil,
        Value::Boolean(b) => ReturnValue::Value(TypedValue::Boolean(b)),
        Value::Integer(i) => ReturnValue::Value(TypedValue::Number(i as f64)),
        Value::Number(n) => ReturnValue::Value(TypedValue::Number(n)),
        Value::String(s) => ReturnValue::Value(TypedValue::String(s.to_string_lossy().into_owned())),
        other => {
            let tostring: Function = lua.globals().get("tostring")?;
            ReturnValue::Opaque(tostring.call::<_, String>(other)?)
        }
    })
}
