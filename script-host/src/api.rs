//! Functions installed into every script context.
//!
//! | Lua                                   | Effect                               |
//! |---------------------------------------|--------------------------------------|
//! | `print(...)`, `io.write(...)`         | captured output                      |
//! | `io.stdout:write`, `io.stderr:write`  | captured output                      |
//! | `weechat.register(name, author, version, license, description, shutdown_func, charset)` | register the script being loaded → bool |
//! | `weechat.signal_send(signal, data)`   | send a signal → `WEECHAT_RC_OK`      |
//! | `weechat.WEECHAT_RC_*`                | return code constants                |

use std::rc::{Rc, Weak};

use mlua::prelude::*;

use crate::engine::Shared;
use crate::script::{Registration, ScriptId};
use crate::value::string_text;
use crate::{API_TABLE, PLUGIN_NAME};

pub const WEECHAT_RC_OK: i64 = 0;
pub const WEECHAT_RC_OK_EAT: i64 = 1;
pub const WEECHAT_RC_ERROR: i64 = -1;

/// Route the standard stream objects through the captured `io.write`, and
/// keep scripts from exiting the host process.
const STREAM_SHIM: &str = r#"
local write = io.write
local function stream()
    return {
        write = function(self, ...) write(...) return self end,
        flush = function(self) return self end,
        setvbuf = function() return true end,
        close = function() return nil, "cannot close standard file" end,
    }
end
io.stdout = stream()
io.stderr = stream()
io.output = function() return io.stdout end
if os then
    os.exit = function() error("os.exit is not allowed in scripts", 2) end
end
"#;

pub(crate) fn install(lua: &Lua, shared: Weak<Shared>) -> LuaResult<()> {
    let globals = lua.globals();

    // Output functions may run from finalizers while the state closes, so
    // they never reach back into the state through `lua`.

    // print(...) → tab-separated tostring() of every argument, plus newline
    {
        let shared = shared.clone();
        let tostring: LuaFunction = globals.get("tostring")?;
        globals.set(
            "print",
            lua.create_function(move |_, args: LuaMultiValue| {
                let mut line = String::new();
                for (i, value) in args.into_iter().enumerate() {
                    if i > 0 {
                        line.push('\t');
                    }
                    let text: LuaString = tostring.call(value)?;
                    line.push_str(&string_text(&text));
                }
                line.push('\n');
                if let Some(shared) = shared.upgrade() {
                    shared.write(&line);
                }
                Ok(())
            })?,
        )?;
    }

    // io.write(...) → strings and numbers, no separator
    {
        let shared = shared.clone();
        let io: LuaTable = globals.get("io")?;
        io.set(
            "write",
            lua.create_function(move |_, args: LuaMultiValue| {
                let mut text = String::new();
                for (i, value) in args.into_iter().enumerate() {
                    match write_text(&value) {
                        Some(s) => text.push_str(&s),
                        None => {
                            let type_name = value.type_name();
                            return Err(LuaError::RuntimeError(format!(
                                "bad argument #{} to 'write' (string expected, got {type_name})",
                                i + 1
                            )))
                        }
                    }
                }
                if let Some(shared) = shared.upgrade() {
                    shared.write(&text);
                }
                Ok(())
            })?,
        )?;
    }
    lua.load(STREAM_SHIM).set_name("=stdio").exec()?;

    let api = lua.create_table()?;

    {
        let shared = shared.clone();
        api.set(
            "register",
            lua.create_function(
                move |_,
                      (name, author, version, license, description, shutdown_func, charset): (
                    String,
                    String,
                    String,
                    String,
                    String,
                    Option<String>,
                    Option<String>,
                )| {
                    let Some(shared) = shared.upgrade() else { return Ok(false) };
                    let meta = Registration {
                        name,
                        author,
                        version,
                        license,
                        description,
                        shutdown_func: shutdown_func.unwrap_or_default(),
                        charset: charset.unwrap_or_default(),
                    };
                    Ok(register(&shared, meta).is_some())
                },
            )?,
        )?;
    }

    {
        let shared = shared.clone();
        api.set(
            "signal_send",
            lua.create_function(move |_, (signal, data): (String, Option<String>)| {
                let Some(shared) = shared.upgrade() else { return Ok(WEECHAT_RC_ERROR) };
                let data = data.unwrap_or_default();
                if !shared.handle_signal(&signal, &data) {
                    shared.host.signal_send(&signal, &data);
                }
                Ok(WEECHAT_RC_OK)
            })?,
        )?;
    }

    api.set("WEECHAT_RC_OK", WEECHAT_RC_OK)?;
    api.set("WEECHAT_RC_OK_EAT", WEECHAT_RC_OK_EAT)?;
    api.set("WEECHAT_RC_ERROR", WEECHAT_RC_ERROR)?;
    api.set("plugin_name", PLUGIN_NAME)?;
    globals.set(API_TABLE, api)?;

    Ok(())
}

/// What `io.write` prints for `value`: strings as is, numbers the way Lua
/// formats them.
fn write_text(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(string_text(s)),
        LuaValue::Integer(i) => Some(i.to_string()),
        LuaValue::Number(n) => Some(number_text(*n)),
        _ => None,
    }
}

fn number_text(n: f64) -> String {
    if n.is_nan() {
        "nan".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else if n.abs() >= 1e15 || n.abs() < 1e-4 {
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp:0>2}"),
            Some((mantissa, exp)) => format!("{mantissa}e-{:0>2}", &exp[1..]),
            None => text,
        }
    } else {
        n.to_string()
    }
}

/// Register the script currently being loaded.
///
/// Moves the loading context into the registry and makes the new script
/// active for the rest of its load.
fn register(shared: &Rc<Shared>, meta: Registration) -> Option<ScriptId> {
    let name = meta.name.clone();
    let outcome = {
        let mut st = shared.state.borrow_mut();
        let st = &mut *st;
        match st.loading.as_mut() {
            None => Err(format!("unable to register script \"{name}\" (no script is being loaded)")),
            Some(slot) if slot.registered.is_some() => {
                Err(format!("unable to register script \"{name}\" (script already registered)"))
            }
            Some(_) if st.registry.find(&name).is_some() => Err(format!(
                "unable to register script \"{name}\" (another script already exists with this name)"
            )),
            Some(slot) => match slot.context.take() {
                Some(context) => {
                    let id = st.registry.add(&slot.filename, meta.clone(), context);
                    slot.registered = Some(id);
                    st.active = Some(id);
                    Ok((id, st.config.check_license))
                }
                None => Err(format!("unable to register script \"{name}\" (no context)")),
            },
        }
    };

    match outcome {
        Ok((id, check_license)) => {
            tracing::debug!(script = %name, %id, "script registered");
            let host_license = shared.host.license().to_owned();
            if check_license && meta.license != host_license {
                shared.host.print(
                    None,
                    &format!(
                        "{PLUGIN_NAME}: warning, license \"{}\" for script \"{name}\" differs from host license (\"{host_license}\")",
                        meta.license
                    ),
                );
            }
            if shared.verbose() {
                shared.info(&format!(
                    "registered script \"{name}\", version {} ({})",
                    meta.version, meta.description
                ));
            }
            Some(id)
        }
        Err(message) => {
            shared.error(&message);
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
