use mlua::{HookTriggers, Lua, Table, Value as LuaValue, Variadic, VmState};
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};

use super::{lock_state, SandboxImage, SharedState};
use crate::types::{ExecutionOutcome, NULL_CLASS};

const DEFAULT_EDGE: u32 = 512;

/// Nesting limit for returned tables; also stops self-referencing tables.
const MAX_JSON_DEPTH: usize = 64;

pub(super) fn timeout_message(limit: Duration) -> String {
    format!("Script execution timed out after {:?}", limit)
}

/// Evaluate a script synchronously (called from spawn_blocking).
///
/// The VM is interrupted once `limit` has elapsed, so a timed-out script
/// cannot touch host state after its failure is reported.
pub(super) fn eval_blocking(code: &str, state: SharedState, limit: Duration) -> ExecutionOutcome {
    let outcome = create_sandboxed_lua(state, limit).and_then(|lua| {
        let value: LuaValue = lua.load(code).set_name("script").eval()?;
        let class = class_of(&value);
        Ok(ExecutionOutcome::success(class, lua_to_json(&value, 0)?))
    });

    match outcome {
        Ok(outcome) => outcome,
        Err(e) => ExecutionOutcome::failure(e.to_string()),
    }
}

fn class_of(value: &LuaValue) -> &'static str {
    match value {
        LuaValue::Nil => NULL_CLASS,
        other => other.type_name(),
    }
}

/// Create a sandboxed Lua VM wired to host state.
fn create_sandboxed_lua(state: SharedState, limit: Duration) -> mlua::Result<Lua> {
    let lua = Lua::new();

    register_stdlib(&lua)?;
    remove_dangerous_globals(&lua)?;
    register_images(&lua, state.clone())?;
    register_editor(&lua, state)?;

    let deadline = Instant::now() + limit;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(1_000),
        move |_, _| {
            if Instant::now() >= deadline {
                Err(mlua::Error::RuntimeError(timeout_message(limit)))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    Ok(lua)
}

fn register_stdlib(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    let log_table = lua.create_table()?;

    log_table.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "fijihost::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "fijihost::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "fijihost::script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "fijihost::script", "{}", msg);
            Ok(())
        })?,
    )?;
    globals.set("log", log_table)?;

    // stdout belongs to the protocol, so print goes to the log
    globals.set(
        "print",
        lua.create_function(|_, args: Variadic<LuaValue>| {
            let parts = args
                .iter()
                .map(|v| v.to_string())
                .collect::<mlua::Result<Vec<_>>>()?;
            tracing::info!(target: "fijihost::script", "{}", parts.join("\t"));
            Ok(())
        })?,
    )?;

    Ok(())
}

/// Remove globals that could be used to escape the sandbox.
fn remove_dangerous_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set("dofile", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;
    globals.set("require", LuaValue::Nil)?;

    let os_table: Table = globals.get("os")?;
    for name in [
        "execute", "exit", "remove", "rename", "setenv", "setlocale", "tmpname", "getenv",
    ] {
        os_table.set(name, LuaValue::Nil)?;
    }
    // Keep: os.clock, os.date, os.difftime, os.time

    globals.set("debug", LuaValue::Nil)?;
    globals.set("io", LuaValue::Nil)?;
    globals.set("package", LuaValue::Nil)?;

    Ok(())
}

fn register_images(lua: &Lua, state: SharedState) -> mlua::Result<()> {
    let images = lua.create_table()?;

    let open_state = state.clone();
    images.set(
        "open",
        lua.create_function(move |_, spec: Table| {
            let dim = |key: &str, default: u32| -> mlua::Result<u32> {
                Ok(spec.get::<Option<u32>>(key)?.unwrap_or(default))
            };
            let image = SandboxImage {
                title: spec.get::<String>("title")?,
                width: dim("width", DEFAULT_EDGE)?,
                height: dim("height", DEFAULT_EDGE)?,
                slices: dim("slices", 1)?,
                channels: dim("channels", 1)?,
                frames: dim("frames", 1)?,
            };
            let title = image.title.clone();
            lock_state(&open_state).open_image(image);
            Ok(title)
        })?,
    )?;

    let close_state = state.clone();
    images.set(
        "close",
        lua.create_function(move |_, title: String| Ok(lock_state(&close_state).close_image(&title)))?,
    )?;

    let select_state = state.clone();
    images.set(
        "select",
        lua.create_function(move |_, title: String| {
            Ok(lock_state(&select_state).select_image(&title))
        })?,
    )?;

    images.set(
        "list",
        lua.create_function(move |_, ()| Ok(lock_state(&state).image_titles()))?,
    )?;

    lua.globals().set("images", images)
}

fn register_editor(lua: &Lua, state: SharedState) -> mlua::Result<()> {
    let editor = lua.create_table()?;

    let get_state = state.clone();
    editor.set(
        "get",
        lua.create_function(move |_, title: String| Ok(lock_state(&get_state).get_script(&title)))?,
    )?;

    editor.set(
        "put",
        lua.create_function(move |_, (title, code): (String, String)| {
            lock_state(&state).put_script(&title, &code);
            Ok(())
        })?,
    )?;

    lua.globals().set("editor", editor)
}

/// Convert a Lua value to a JSON value.
fn lua_to_json(value: &LuaValue, depth: usize) -> mlua::Result<JsonValue> {
    if depth > MAX_JSON_DEPTH {
        return Err(mlua::Error::RuntimeError(format!(
            "returned value is nested deeper than {} levels (self-referencing table?)",
            MAX_JSON_DEPTH
        )));
    }

    match value {
        LuaValue::Nil => Ok(JsonValue::Null),
        LuaValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        LuaValue::Integer(i) => Ok(JsonValue::Number((*i).into())),
        LuaValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("cannot represent {} as JSON", n))),
        LuaValue::String(s) => Ok(JsonValue::String(s.to_str()?.to_string())),
        LuaValue::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut arr = Vec::with_capacity(len);
                for i in 1..=len {
                    let v: LuaValue = table.raw_get(i as i64)?;
                    arr.push(lua_to_json(&v, depth + 1)?);
                }
                return Ok(JsonValue::Array(arr));
            }

            let mut obj = serde_json::Map::new();
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (k, v) = pair?;
                let key = match k {
                    LuaValue::String(s) => s.to_str()?.to_string(),
                    LuaValue::Integer(i) => i.to_string(),
                    LuaValue::Number(n) => n.to_string(),
                    _ => continue,
                };
                obj.insert(key, lua_to_json(&v, depth + 1)?);
            }
            Ok(JsonValue::Object(obj))
        }
        other => Ok(JsonValue::String(format!("[{}]", other.type_name()))),
    }
}
