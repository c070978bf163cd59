//! Calling script functions from the host.
//!
//! [`ScriptEngine::invoke`] runs one named function in one script's context
//! and converts its return value into the [`ResultKind`] the host asked for.
//! Nothing a script does here can panic the host or leave the wrong context
//! active: failures are printed, and the call yields `None`.

use mlua::prelude::*;

use crate::context::ContextGuard;
use crate::engine::ScriptEngine;
use crate::host::{Host, Pointer};
use crate::script::ScriptId;
use crate::value::{decode_text, from_script_mapping, to_script_mapping, HashTable, TableType};

/// Most arguments a host may pass in one call.
pub const MAX_ARGS: usize = 16;

/// The type the host expects back from a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    String,
    Pointer,
    Int,
    HashTable,
    /// The return value is not wanted.
    Ignore,
}

/// An argument passed to a script function.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecArg {
    Str(String),
    Int(i64),
    /// Passed to the script in its text form.
    Pointer(Pointer),
    HashTable(HashTable),
}

/// A converted return value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecValue {
    Str(String),
    Pointer(Pointer),
    Int(i64),
    HashTable(HashTable),
}

impl ExecValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ExecValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExecValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

enum Coerced {
    Value(ExecValue),
    Ignored,
    Mismatch,
}

impl ResultKind {
    fn coerce(self, host: &dyn Host, script: &str, function: &str, value: &LuaValue) -> Coerced {
        match self {
            ResultKind::String => coerce_string(value),
            ResultKind::Pointer => coerce_pointer(host, script, function, value),
            ResultKind::Int => coerce_int(value),
            ResultKind::HashTable => coerce_hashtable(host, value),
            ResultKind::Ignore => Coerced::Ignored,
        }
    }
}

fn coerce_string(value: &LuaValue) -> Coerced {
    decode_text(value).map_or(Coerced::Mismatch, |s| Coerced::Value(ExecValue::Str(s)))
}

fn coerce_pointer(host: &dyn Host, script: &str, function: &str, value: &LuaValue) -> Coerced {
    match decode_text(value) {
        // An unknown handle is a valid answer, not a type error.
        Some(text) => match host.str_to_ptr(Some(script), Some(function), &text) {
            Some(ptr) => Coerced::Value(ExecValue::Pointer(ptr)),
            None => Coerced::Ignored,
        },
        None => Coerced::Mismatch,
    }
}

fn coerce_int(value: &LuaValue) -> Coerced {
    let int = match *value {
        LuaValue::Integer(i) => Some(i),
        LuaValue::Number(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some(f as i64)
        }
        LuaValue::Boolean(b) => Some(i64::from(b)),
        _ => None,
    };
    int.map_or(Coerced::Mismatch, |i| Coerced::Value(ExecValue::Int(i)))
}

fn coerce_hashtable(host: &dyn Host, value: &LuaValue) -> Coerced {
    match value {
        LuaValue::Table(t) => Coerced::Value(ExecValue::HashTable(from_script_mapping(
            host,
            t,
            16,
            TableType::String,
            TableType::String,
        ))),
        _ => Coerced::Mismatch,
    }
}

// ── invoke ────────────────────────────────────────────────────────────────────

impl ScriptEngine {
    /// Call `function` in `script` and convert what it returns.
    ///
    /// A function that returns nothing counts as returning `0`.  Returns
    /// `None` when the call is impossible, raises, or returns a value that
    /// does not fit `kind` (and always for [`ResultKind::Ignore`]).
    pub fn invoke(
        &self,
        script: ScriptId,
        kind: ResultKind,
        function: &str,
        args: &[ExecArg],
    ) -> Option<ExecValue> {
        let shared = &*self.shared;
        if args.len() > MAX_ARGS {
            tracing::error!(%script, function, count = args.len(), "too many arguments");
            shared.error(&format!(
                "too many arguments ({}) for function \"{function}\" (max {MAX_ARGS})",
                args.len()
            ));
            return None;
        }

        let found = {
            let st = shared.state.borrow();
            st.registry.get(script).map(|s| (s.context.lua(), s.name().to_owned()))
        };
        let Some((lua, name)) = found else {
            shared.error(&format!("unable to run function \"{function}\" (script {script} not loaded)"));
            return None;
        };

        let _guard = ContextGuard::enter(shared, Some(script));

        let func = match lua.globals().get::<LuaValue>(function) {
            Ok(LuaValue::Function(f)) => f,
            _ => {
                shared.error(&format!("unable to run function \"{function}\""));
                return None;
            }
        };

        let call_args = match marshal_args(&lua, &*shared.host, args) {
            Ok(values) => values,
            Err(e) => {
                shared.report_lua_error(&e);
                shared.error(&format!("unable to run function \"{function}\""));
                return None;
            }
        };

        let outcome = func.call::<LuaMultiValue>(call_args);
        shared.flush();

        let result = match outcome {
            Err(e) => {
                shared.report_lua_error(&e);
                None
            }
            Ok(values) => {
                let value = values.into_iter().next().unwrap_or(LuaValue::Integer(0));
                match kind.coerce(&*shared.host, &name, function, &value) {
                    Coerced::Value(v) => Some(v),
                    Coerced::Ignored => None,
                    Coerced::Mismatch => {
                        shared.error(&format!("function \"{function}\" must return a valid value"));
                        None
                    }
                }
            }
        };

        if kind != ResultKind::Ignore && result.is_none() {
            shared.error(&format!("error in function \"{function}\""));
        }
        shared.flush();
        result
    }
}

fn marshal_args(lua: &Lua, host: &dyn Host, args: &[ExecArg]) -> LuaResult<LuaMultiValue> {
    let values = args
        .iter()
        .map(|arg| {
            Ok(match arg {
                ExecArg::Str(s) => LuaValue::String(lua.create_string(s)?),
                ExecArg::Int(i) => LuaValue::Integer(*i),
                ExecArg::Pointer(p) => LuaValue::String(lua.create_string(host.ptr_to_str(*p))?),
                ExecArg::HashTable(t) => to_script_mapping(lua, host, t),
            })
        })
        .collect::<LuaResult<Vec<_>>>()?;
    Ok(LuaMultiValue::from_vec(values))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn lua_value(lua: &Lua, code: &str) -> LuaValue {
        lua.load(code).eval().unwrap()
    }

    fn int_of(c: Coerced) -> Option<i64> {
        match c {
            Coerced::Value(ExecValue::Int(i)) => Some(i),
            _ => None,
        }
    }

    #[test]
    fn int_accepts_integral_numbers_and_booleans() {
        let lua = Lua::new();
        assert_eq!(int_of(coerce_int(&lua_value(&lua, "return 7"))), Some(7));
        assert_eq!(int_of(coerce_int(&lua_value(&lua, "return 3.0"))), Some(3));
        assert_eq!(int_of(coerce_int(&lua_value(&lua, "return true"))), Some(1));
        assert!(matches!(coerce_int(&lua_value(&lua, "return 2.5")), Coerced::Mismatch));
        assert!(matches!(coerce_int(&lua_value(&lua, "return '5'")), Coerced::Mismatch));
        assert!(matches!(coerce_int(&LuaValue::Nil), Coerced::Mismatch));
    }

    #[test]
    fn string_requires_a_string() {
        let lua = Lua::new();
        assert!(matches!(
            coerce_string(&lua_value(&lua, "return 'ok'")),
            Coerced::Value(ExecValue::Str(ref s)) if s == "ok"
        ));
        assert!(matches!(coerce_string(&lua_value(&lua, "return {}")), Coerced::Mismatch));
    }

    #[test]
    fn pointer_resolves_through_host() {
        let lua = Lua::new();
        let host = RecordingHost::new();
        assert!(matches!(
            coerce_pointer(&host, "s", "f", &lua_value(&lua, "return '0x10'")),
            Coerced::Value(ExecValue::Pointer(Pointer(0x10)))
        ));
        assert!(matches!(
            coerce_pointer(&host, "s", "f", &lua_value(&lua, "return 'none'")),
            Coerced::Ignored
        ));
        assert!(matches!(
            coerce_pointer(&host, "s", "f", &lua_value(&lua, "return 16")),
            Coerced::Mismatch
        ));
    }

    #[test]
    fn hashtable_requires_a_table() {
        let lua = Lua::new();
        let host = RecordingHost::new();
        match coerce_hashtable(&host, &lua_value(&lua, "return { k = 'v' }")) {
            Coerced::Value(ExecValue::HashTable(t)) => assert_eq!(t.get_str("k"), Some("v")),
            _ => panic!("expected a hashtable"),
        }
        assert!(matches!(coerce_hashtable(&host, &lua_value(&lua, "return 'x'")), Coerced::Mismatch));
    }

    #[test]
    fn ignore_never_mismatches() {
        let host = RecordingHost::new();
        assert!(matches!(
            ResultKind::Ignore.coerce(&host, "s", "f", &LuaValue::Nil),
            Coerced::Ignored
        ));
    }
}
